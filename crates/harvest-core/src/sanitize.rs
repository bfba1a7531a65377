//! Harvested-area cell sanitizing.

use crate::source::Cell;

/// What a crop cell turned out to hold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellOutcome {
    /// Positive, finite hectares.
    Area(f64),
    /// Nothing reported: missing, `-`, blank, zero or negative.
    Absent,
    /// Something was there but it is not a number.
    Unreadable,
}

impl CellOutcome {
    pub fn area(self) -> Option<f64> {
        match self {
            CellOutcome::Area(value) => Some(value),
            _ => None,
        }
    }
}

/// Classify a crop cell.
///
/// Text is normalized by turning every `,` into `.` and dropping all
/// whitespace before parsing. The rule is not thousands-separator aware:
/// `"1.234,5"` becomes `"1.234.5"` and is unreadable.
pub fn classify_cell(cell: &Cell) -> CellOutcome {
    let value = match cell {
        Cell::Empty => return CellOutcome::Absent,
        Cell::Error(_) => return CellOutcome::Unreadable,
        Cell::Number(n) => *n,
        Cell::Text(raw) => {
            let raw = raw.trim();
            if raw.is_empty() || raw == "-" {
                return CellOutcome::Absent;
            }
            let normalized: String = raw
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            match normalized.parse::<f64>() {
                Ok(n) => n,
                Err(_) => return CellOutcome::Unreadable,
            }
        }
    };

    if !value.is_finite() {
        CellOutcome::Unreadable
    } else if value <= 0.0 {
        CellOutcome::Absent
    } else {
        CellOutcome::Area(value)
    }
}

/// Usable positive hectares for a cell, or `None`. Never fails.
pub fn sanitize_area(cell: &Cell) -> Option<f64> {
    classify_cell(cell).area()
}
