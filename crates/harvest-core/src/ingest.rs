//! Ingestion pipeline: municipality rows x crop columns -> flat records.
//!
//! Deterministic: the same table and year always yield the same records in
//! the same order (rows in source order, crops in column order).

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::locality::{normalize_municipality_code, parse_locality};
use crate::sanitize::{classify_cell, CellOutcome};
use crate::source::{Cell, Table};

/// Name used when a row has a code but no locality cell.
const UNKNOWN_MUNICIPALITY: &str = "Unknown";

static EMPTY_CELL: Cell = Cell::Empty;

/// One (municipality, crop) harvested-area observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestedRecord {
    pub municipality_code: String,
    pub municipality_name: String,
    pub state_code: String,
    pub crop_name: String,
    pub harvested_area: f64,
    pub year: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestOutcome {
    pub records: Vec<IngestedRecord>,
    /// Records emitted.
    pub processed_count: usize,
    /// Rows skipped as unreadable plus cells that failed numeric conversion.
    pub error_count: usize,
    /// Rows that yielded a municipality (whether or not any crop cell was valid).
    pub municipalities_seen: usize,
}

/// Run the pipeline over a table. Never fails; per-row and per-cell problems
/// are absorbed into `error_count`.
pub fn ingest(table: &Table, year: i32) -> IngestOutcome {
    let crops: Vec<(usize, &str)> = table.crop_columns().collect();
    let mut outcome = IngestOutcome::default();

    for (row_idx, row) in table.rows.iter().enumerate() {
        let line = row_idx + 2; // 1-indexed, after header

        let code = row.first().and_then(Cell::as_text);
        let locality = row.get(1).and_then(Cell::as_text);
        if code.is_none() && locality.is_none() {
            warn!(line, "skipping row without municipality code or name");
            outcome.error_count += 1;
            continue;
        }

        let municipality_code = normalize_municipality_code(code.as_deref());
        let (municipality_name, state_code) =
            parse_locality(locality.as_deref().unwrap_or(UNKNOWN_MUNICIPALITY));
        outcome.municipalities_seen += 1;

        for &(col, crop_name) in &crops {
            let cell = row.get(col).unwrap_or(&EMPTY_CELL);
            match classify_cell(cell) {
                CellOutcome::Area(harvested_area) => {
                    outcome.records.push(IngestedRecord {
                        municipality_code: municipality_code.clone(),
                        municipality_name: municipality_name.clone(),
                        state_code: state_code.clone(),
                        crop_name: crop_name.to_string(),
                        harvested_area,
                        year,
                    });
                }
                CellOutcome::Absent => {}
                CellOutcome::Unreadable => {
                    debug!(line, crop = crop_name, cell = ?cell, "unreadable area cell");
                    outcome.error_count += 1;
                }
            }
        }

        if outcome.municipalities_seen % 1000 == 0 {
            debug!(municipalities = outcome.municipalities_seen, "ingest progress");
        }
    }

    outcome.processed_count = outcome.records.len();
    info!(
        records = outcome.processed_count,
        errors = outcome.error_count,
        municipalities = outcome.municipalities_seen,
        crops = crops.len(),
        "ingest finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build_crop_index;

    fn table(headers: &[&str], rows: Vec<Vec<Cell>>) -> Table {
        Table {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    fn sample() -> Table {
        table(
            &["Cód.", "Município", "Soja (em grão)", "Abacaxi*"],
            vec![
                vec![
                    Cell::Number(1100015.0),
                    "Alta Floresta D'Oeste (RO)".into(),
                    Cell::Number(1318.0),
                    "-".into(),
                ],
                vec![
                    "1100023".into(),
                    "Ariquemes (RO)".into(),
                    Cell::Empty,
                    "22".into(),
                ],
                vec![
                    "510340".into(),
                    "Lucas do Rio Verde (MT)".into(),
                    "420000".into(),
                    "3,5".into(),
                ],
            ],
        )
    }

    #[test]
    fn test_ingest_three_by_two() {
        let outcome = ingest(&sample(), 2023);
        assert_eq!(outcome.processed_count, 4);
        assert_eq!(outcome.records.len(), 4);
        assert_eq!(outcome.error_count, 0);
        assert_eq!(outcome.municipalities_seen, 3);

        let index = build_crop_index(&outcome.records);
        assert_eq!(index.len(), 2);
        assert_eq!(index["Soja (em grão)"].len(), 2);
        assert_eq!(index["Abacaxi*"].len(), 2);
        assert_eq!(index["Abacaxi*"]["0510340"].harvested_area, 3.5);
    }

    #[test]
    fn test_ingest_record_fields() {
        let outcome = ingest(&sample(), 2023);
        let first = &outcome.records[0];
        assert_eq!(first.municipality_code, "1100015");
        assert_eq!(first.municipality_name, "Alta Floresta D'Oeste");
        assert_eq!(first.state_code, "RO");
        assert_eq!(first.crop_name, "Soja (em grão)");
        assert_eq!(first.harvested_area, 1318.0);
        assert_eq!(first.year, 2023);
    }

    #[test]
    fn test_ingest_record_order_is_row_then_column() {
        let outcome = ingest(&sample(), 2023);
        let keys: Vec<(&str, &str)> = outcome
            .records
            .iter()
            .map(|r| (r.municipality_code.as_str(), r.crop_name.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("1100015", "Soja (em grão)"),
                ("1100023", "Abacaxi*"),
                ("0510340", "Soja (em grão)"),
                ("0510340", "Abacaxi*"),
            ]
        );
    }

    #[test]
    fn test_unreadable_cells_count_as_errors_but_keep_row() {
        let t = table(
            &["code", "name", "Milho", "Feijão"],
            vec![vec!["1".into(), "A (RO)".into(), "abc".into(), "10".into()]],
        );
        let outcome = ingest(&t, 2023);
        assert_eq!(outcome.processed_count, 1);
        assert_eq!(outcome.error_count, 1);
        assert_eq!(outcome.records[0].crop_name, "Feijão");
    }

    #[test]
    fn test_row_without_code_and_name_is_skipped() {
        let t = table(
            &["code", "name", "Milho"],
            vec![
                vec![Cell::Empty, Cell::Empty, "10".into()],
                vec![],
                vec!["2".into(), "B (SP)".into(), "5".into()],
            ],
        );
        let outcome = ingest(&t, 2023);
        assert_eq!(outcome.error_count, 2);
        assert_eq!(outcome.processed_count, 1);
        assert_eq!(outcome.records[0].municipality_code, "0000002");
    }

    #[test]
    fn test_partial_identity_is_coerced() {
        let t = table(
            &["code", "name", "Milho"],
            vec![
                vec![Cell::Empty, "Sem Código (GO)".into(), "7".into()],
                vec!["5208707".into(), Cell::Empty, "8".into()],
            ],
        );
        let outcome = ingest(&t, 2023);
        assert_eq!(outcome.error_count, 0);
        assert_eq!(outcome.records[0].municipality_code, "0");
        assert_eq!(outcome.records[0].state_code, "GO");
        assert_eq!(outcome.records[1].municipality_name, "Unknown");
        assert_eq!(outcome.records[1].state_code, "XX");
    }

    #[test]
    fn test_short_rows_treat_missing_cells_as_absent() {
        let t = table(
            &["code", "name", "Milho", "Soja"],
            vec![vec!["1".into(), "A (RO)".into(), "3".into()]],
        );
        let outcome = ingest(&t, 2023);
        assert_eq!(outcome.processed_count, 1);
        assert_eq!(outcome.error_count, 0);
    }

    #[test]
    fn test_crop_names_are_verbatim() {
        let t = table(
            &["code", "name", " Coco-da-baía* "],
            vec![vec!["1".into(), "A (RO)".into(), "2".into()]],
        );
        let outcome = ingest(&t, 2023);
        assert_eq!(outcome.records[0].crop_name, " Coco-da-baía* ");
    }

    #[test]
    fn test_ingest_is_deterministic() {
        let a = ingest(&sample(), 2023);
        let b = ingest(&sample(), 2023);
        assert_eq!(a, b);
    }

    #[test]
    fn test_header_only_table() {
        let t = table(&["code", "name", "Milho"], vec![]);
        let outcome = ingest(&t, 2023);
        assert_eq!(outcome.processed_count, 0);
        assert_eq!(outcome.error_count, 0);
    }
}
