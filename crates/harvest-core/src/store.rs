//! Persistence sinks: full-refresh record storage plus an append-only
//! processing-run log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::index::build_crop_index;
use crate::ingest::IngestedRecord;

/// File name of the JSON-lines run log kept next to the serving artifact.
pub const LOG_FILE_NAME: &str = "processing_log.jsonl";

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS crop_data (
    id                BIGSERIAL PRIMARY KEY,
    municipality_code VARCHAR(10)      NOT NULL,
    municipality_name VARCHAR(100)     NOT NULL,
    state_code        VARCHAR(2)       NOT NULL,
    crop_name         VARCHAR(100)     NOT NULL,
    harvested_area    DOUBLE PRECISION NOT NULL,
    year              INTEGER          NOT NULL DEFAULT 2023,
    created_at        TIMESTAMPTZ      NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS crop_data_crop_name_idx ON crop_data (crop_name);

CREATE TABLE IF NOT EXISTS processing_logs (
    run_id            UUID PRIMARY KEY,
    filename          VARCHAR(200) NOT NULL,
    status            VARCHAR(50)  NOT NULL,
    records_processed BIGINT       NOT NULL DEFAULT 0,
    error_message     TEXT,
    processed_at      TIMESTAMPTZ  NOT NULL DEFAULT now()
);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }
}

/// One entry of the processing audit trail. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    pub run_id: Uuid,
    pub filename: String,
    pub status: RunStatus,
    #[serde(default)]
    pub records_processed: i64,
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessingLogEntry {
    pub fn success(filename: &str, records_processed: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            filename: filename.to_string(),
            status: RunStatus::Success,
            records_processed: records_processed as i64,
            error_message: None,
            processed_at: Utc::now(),
        }
    }

    pub fn error(filename: &str, message: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            filename: filename.to_string(),
            status: RunStatus::Error,
            records_processed: 0,
            error_message: Some(message.into()),
            processed_at: Utc::now(),
        }
    }
}

/// Sole writer of ingested records and run log entries.
#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;

    /// Drop every previously stored record and store `records` instead.
    /// Readers must never observe a partially replaced set.
    async fn replace_records(&self, records: &[IngestedRecord]) -> Result<(), StoreError>;

    async fn append_log(&self, entry: &ProcessingLogEntry) -> Result<(), StoreError>;
}

/// Run log path for a given serving artifact.
pub fn log_path_for(data_file: &Path) -> PathBuf {
    data_file.with_file_name(LOG_FILE_NAME)
}

// =============================================================================
// Static JSON artifact
// =============================================================================

/// Writes the crop-indexed JSON artifact the API loads at startup.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for FileSink {
    fn name(&self) -> &str {
        "file"
    }

    async fn replace_records(&self, records: &[IngestedRecord]) -> Result<(), StoreError> {
        let index = build_crop_index(records);
        let bytes = serde_json::to_vec_pretty(&index)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Temp file + rename so the artifact is swapped in one step.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &self.path).await?;

        info!(
            path = %self.path.display(),
            crops = index.len(),
            bytes = bytes.len(),
            "crop index written"
        );
        Ok(())
    }

    async fn append_log(&self, entry: &ProcessingLogEntry) -> Result<(), StoreError> {
        let log_path = log_path_for(&self.path);
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        debug!(path = %log_path.display(), status = entry.status.as_str(), "run logged");
        Ok(())
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// Create tables if missing. Safe to run on every start.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordSink for PgSink {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn replace_records(&self, records: &[IngestedRecord]) -> Result<(), StoreError> {
        // Delete and inserts commit together.
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM crop_data")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO crop_data
                (municipality_code, municipality_name, state_code, crop_name, harvested_area, year)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&record.municipality_code)
            .bind(&record.municipality_name)
            .bind(&record.state_code)
            .bind(&record.crop_name)
            .bind(record.harvested_area)
            .bind(record.year)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(deleted, inserted = records.len(), "crop_data replaced");
        Ok(())
    }

    async fn append_log(&self, entry: &ProcessingLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO processing_logs
            (run_id, filename, status, records_processed, error_message, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.run_id)
        .bind(&entry.filename)
        .bind(entry.status.as_str())
        .bind(entry.records_processed)
        .bind(&entry.error_message)
        .bind(entry.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::CropIndex;

    fn record(code: &str, crop: &str, area: f64) -> IngestedRecord {
        IngestedRecord {
            municipality_code: code.to_string(),
            municipality_name: "São Desidério".to_string(),
            state_code: "BA".to_string(),
            crop_name: crop.to_string(),
            harvested_area: area,
            year: 2023,
        }
    }

    #[tokio::test]
    async fn test_file_sink_writes_crop_index() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("data/crop_data_static.json"));
        sink.replace_records(&[record("2927408", "Algodão herbáceo (em caroço)", 185000.0)])
            .await
            .unwrap();

        let text = std::fs::read_to_string(sink.path()).unwrap();
        // Non-ASCII is kept literally, not \u-escaped.
        assert!(text.contains("São Desidério"));
        assert!(text.contains("Algodão herbáceo (em caroço)"));

        let index: CropIndex = serde_json::from_str(&text).unwrap();
        assert_eq!(
            index["Algodão herbáceo (em caroço)"]["2927408"].harvested_area,
            185000.0
        );
        assert!(!sink.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_sink_replace_is_full_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("crops.json"));
        sink.replace_records(&[record("1", "Soja", 1.0), record("2", "Milho", 2.0)])
            .await
            .unwrap();
        sink.replace_records(&[record("1", "Soja", 3.0)]).await.unwrap();

        let index: CropIndex =
            serde_json::from_str(&std::fs::read_to_string(sink.path()).unwrap()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index["Soja"]["1"].harvested_area, 3.0);
    }

    #[tokio::test]
    async fn test_file_sink_log_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("crops.json"));
        sink.append_log(&ProcessingLogEntry::success("ibge.xlsx", 10))
            .await
            .unwrap();
        sink.append_log(&ProcessingLogEntry::error("ibge.xlsx", "boom"))
            .await
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        let entries: Vec<ProcessingLogEntry> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, RunStatus::Success);
        assert_eq!(entries[0].records_processed, 10);
        assert_eq!(entries[1].status, RunStatus::Error);
        assert_eq!(entries[1].error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_log_entry_status_serializes_lowercase() {
        let entry = ProcessingLogEntry::error("x.csv", "missing");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["records_processed"], 0);
    }

    #[test]
    fn test_log_path_for() {
        assert_eq!(
            log_path_for(Path::new("data/crop_data_static.json")),
            PathBuf::from("data/processing_log.jsonl")
        );
    }
}
