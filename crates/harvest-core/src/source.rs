//! Tabular source readers (spreadsheet via calamine, CSV via csv).
//!
//! Expected layout: header row first; column 0 = municipality code,
//! column 1 = "<name> (<UF>)", remaining columns = one crop each.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use tracing::{debug, info};

use crate::error::IngestError;

/// One spreadsheet cell, reduced to what the pipeline cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    /// Spreadsheet error value such as `#N/A`.
    Error(String),
}

impl Cell {
    /// Textual form of the cell, or `None` when it carries nothing usable.
    ///
    /// Whole numbers render without a fractional part so that numeric
    /// municipality codes (`1100015.0`) come out as their digits.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Empty | Cell::Error(_) => None,
            Cell::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else {
                    Some(s.to_string())
                }
            }
            Cell::Number(n) if n.is_finite() && n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(value.to_string())
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&Data> for Cell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Float(f) => Cell::Number(*f),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Error(e) => Cell::Error(e.to_string()),
            other => Cell::Text(other.to_string()),
        }
    }
}

/// Header plus data rows, in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Crop columns: every header from the third column on, verbatim.
    pub fn crop_columns(&self) -> impl Iterator<Item = (usize, &str)> {
        self.headers
            .iter()
            .enumerate()
            .skip(2)
            .map(|(idx, name)| (idx, name.as_str()))
    }

    fn validate(self, path: &str) -> Result<Self, IngestError> {
        if self.headers.len() < 2 {
            return Err(IngestError::unreadable(
                path,
                format!(
                    "expected at least 2 columns (code, municipality), found {}",
                    self.headers.len()
                ),
            ));
        }
        Ok(self)
    }
}

/// Read a tabular export, dispatching on the file extension.
///
/// `.csv` goes through the CSV reader; anything else is handed to calamine
/// (xlsx, xls, xlsb, ods) and only the first worksheet is used.
pub fn read_table(path: &Path) -> Result<Table, IngestError> {
    let shown = path.display().to_string();
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let table = if is_csv {
        let bytes = std::fs::read(path).map_err(|e| IngestError::unreadable(&shown, e))?;
        read_csv_bytes(&bytes, &shown)?
    } else {
        read_workbook(path, &shown)?
    };

    info!(
        path = %shown,
        columns = table.headers.len(),
        rows = table.rows.len(),
        "source table loaded"
    );
    table.validate(&shown)
}

fn read_workbook(path: &Path, shown: &str) -> Result<Table, IngestError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| IngestError::unreadable(shown, e))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = sheet_names
        .first()
        .ok_or_else(|| IngestError::unreadable(shown, "workbook has no sheets"))?;
    debug!(sheet = %sheet_name, sheets = sheet_names.len(), "reading first worksheet");

    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| IngestError::unreadable(shown, e))?;
    table_from_range(&range, shown)
}

/// Convert a calamine range into a `Table`, first row as header (verbatim).
pub fn table_from_range(range: &Range<Data>, shown: &str) -> Result<Table, IngestError> {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or_else(|| IngestError::unreadable(shown, "sheet has no header row"))?
        .iter()
        .map(|cell| match cell {
            Data::String(s) => s.clone(),
            Data::Empty => String::new(),
            other => other.to_string(),
        })
        .collect();

    let rows = rows.map(|row| row.iter().map(Cell::from).collect()).collect();
    Ok(Table { headers, rows })
}

/// Parse CSV bytes. Non-UTF-8 input (SIDRA exports are often Windows-1252)
/// is transcoded before parsing; a leading BOM is dropped.
pub fn read_csv_bytes(bytes: &[u8], shown: &str) -> Result<Table, IngestError> {
    let content = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            debug!(path = %shown, "csv is not utf-8, decoded as windows-1252");
            decoded.into_owned()
        }
    };
    read_csv_str(&content, shown)
}

pub fn read_csv_str(content: &str, shown: &str) -> Result<Table, IngestError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(content))
        .flexible(true)
        // Headers stay verbatim; they become crop names.
        .trim(csv::Trim::Fields)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::unreadable(shown, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(IngestError::unreadable(shown, "csv has no header row"));
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        // A malformed record becomes an empty row; the pipeline counts it.
        let row = match result {
            Ok(record) => record.iter().map(Cell::from).collect(),
            Err(e) => {
                debug!(path = %shown, error = %e, "malformed csv record");
                Vec::new()
            }
        };
        rows.push(row);
    }

    Ok(Table { headers, rows })
}

fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}
