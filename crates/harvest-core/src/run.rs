//! One ingestion run: read, ingest, replace, log. Never fails past this
//! boundary; the outcome is in the returned summary and the run log.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{error, info};

use crate::index::build_crop_index;
use crate::ingest::{ingest, IngestOutcome};
use crate::source::read_table;
use crate::store::{ProcessingLogEntry, RecordSink};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub success: bool,
    pub filename: String,
    pub processed: usize,
    pub errors: usize,
    pub municipalities: usize,
    pub crops: usize,
    pub unique_municipalities: usize,
    /// Crops ranked by how many municipalities report them (top 10).
    pub top_crops: Vec<(String, usize)>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl RunSummary {
    fn failed(filename: &str, error: String) -> Self {
        Self {
            success: false,
            filename: filename.to_string(),
            processed: 0,
            errors: 0,
            municipalities: 0,
            crops: 0,
            unique_municipalities: 0,
            top_crops: Vec::new(),
            message: None,
            error: Some(error),
        }
    }
}

/// Ingest `path` and push the result through every sink.
///
/// Each sink gets exactly one log entry: `success` if its records were
/// replaced, `error` otherwise. With no sinks this is a dry run.
pub async fn run_ingestion(path: &Path, year: i32, sinks: &[&dyn RecordSink]) -> RunSummary {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    info!(path = %path.display(), year, sinks = sinks.len(), "starting ingestion");

    let table = match read_table(path) {
        Ok(table) => table,
        Err(e) => {
            error!(error = %e, "ingestion aborted");
            let message = e.to_string();
            log_everywhere(sinks, &ProcessingLogEntry::error(&filename, &message)).await;
            return RunSummary::failed(&filename, message);
        }
    };

    let outcome = ingest(&table, year);

    let mut failures = Vec::new();
    for sink in sinks {
        let entry = match sink.replace_records(&outcome.records).await {
            Ok(()) => ProcessingLogEntry::success(&filename, outcome.processed_count),
            Err(e) => {
                error!(sink = sink.name(), error = %e, "failed to store records");
                let message = format!("{} sink: {}", sink.name(), e);
                failures.push(message.clone());
                ProcessingLogEntry::error(&filename, message)
            }
        };
        log_once(*sink, &entry).await;
    }

    if !failures.is_empty() {
        return RunSummary::failed(&filename, failures.join("; "));
    }

    let summary = summarize(&filename, &outcome);
    info!(
        processed = summary.processed,
        errors = summary.errors,
        crops = summary.crops,
        unique_municipalities = summary.unique_municipalities,
        "ingestion completed"
    );
    summary
}

fn summarize(filename: &str, outcome: &IngestOutcome) -> RunSummary {
    let index = build_crop_index(&outcome.records);
    let unique_municipalities = index
        .values()
        .flat_map(|m| m.keys())
        .collect::<HashSet<_>>()
        .len();

    let mut top_crops: Vec<(String, usize)> =
        index.iter().map(|(crop, m)| (crop.clone(), m.len())).collect();
    top_crops.sort_by(|a, b| b.1.cmp(&a.1));
    top_crops.truncate(10);

    RunSummary {
        success: true,
        filename: filename.to_string(),
        processed: outcome.processed_count,
        errors: outcome.error_count,
        municipalities: outcome.municipalities_seen,
        crops: index.len(),
        unique_municipalities,
        top_crops,
        message: Some(format!(
            "Successfully processed {} records",
            outcome.processed_count
        )),
        error: None,
    }
}

async fn log_everywhere(sinks: &[&dyn RecordSink], entry: &ProcessingLogEntry) {
    for sink in sinks {
        log_once(*sink, entry).await;
    }
}

async fn log_once(sink: &dyn RecordSink, entry: &ProcessingLogEntry) {
    if let Err(e) = sink.append_log(entry).await {
        error!(sink = sink.name(), error = %e, "failed to append run log");
    }
}
