//! Index sources: where the query service gets its crop index from.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::fs;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::index::{build_crop_index, pivot_to_municipalities, CropIndex, MunicipalityIndex};
use crate::ingest::IngestedRecord;
use crate::store::{log_path_for, ProcessingLogEntry};

/// A fully built, read-only view of the data. Replaced whole on reload.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub crops: CropIndex,
    pub municipalities: MunicipalityIndex,
    /// Time of the most recent processing run, if any was logged.
    pub last_update: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(crops: CropIndex, last_update: Option<DateTime<Utc>>) -> Self {
        let municipalities = pivot_to_municipalities(&crops);
        Self {
            crops,
            municipalities,
            last_update,
        }
    }
}

#[async_trait]
pub trait IndexSource: Send + Sync {
    fn describe(&self) -> String;

    async fn load(&self) -> Result<Snapshot, StoreError>;
}

/// Fixed in-memory index (tests, demos).
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    crops: CropIndex,
    last_update: Option<DateTime<Utc>>,
}

impl MemorySource {
    pub fn new(crops: CropIndex) -> Self {
        Self {
            crops,
            last_update: None,
        }
    }

    pub fn from_records(records: &[IngestedRecord]) -> Self {
        Self::new(build_crop_index(records))
    }

    pub fn with_last_update(mut self, at: DateTime<Utc>) -> Self {
        self.last_update = Some(at);
        self
    }
}

#[async_trait]
impl IndexSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} crops)", self.crops.len())
    }

    async fn load(&self) -> Result<Snapshot, StoreError> {
        Ok(Snapshot::new(self.crops.clone(), self.last_update))
    }
}

/// Static JSON artifact written by the ingester, plus its run log.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl IndexSource for FileSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    /// A missing artifact (nothing ingested yet) loads as an empty index so
    /// the API can start and pick the file up on reload.
    async fn load(&self) -> Result<Snapshot, StoreError> {
        let crops: CropIndex = match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "crop index not found, serving empty index");
                CropIndex::new()
            }
            Err(e) => return Err(e.into()),
        };
        let last_update = latest_log_entry(&log_path_for(&self.path)).await?;
        info!(path = %self.path.display(), crops = crops.len(), "crop index loaded");
        Ok(Snapshot::new(crops, last_update))
    }
}

/// Latest `processed_at` in a JSON-lines run log. A missing log is not an
/// error; malformed lines are skipped.
async fn latest_log_entry(path: &Path) -> Result<Option<DateTime<Utc>>, StoreError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut latest: Option<DateTime<Utc>> = None;
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ProcessingLogEntry>(line) {
            Ok(entry) => latest = latest.max(Some(entry.processed_at)),
            Err(e) => warn!(path = %path.display(), line = idx + 1, error = %e, "bad log line"),
        }
    }
    Ok(latest)
}

/// `crop_data` / `processing_logs` tables written by `PgSink`.
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IndexSource for PgSource {
    fn describe(&self) -> String {
        "postgres crop_data".to_string()
    }

    async fn load(&self) -> Result<Snapshot, StoreError> {
        let rows: Vec<(String, String, String, String, f64, i32)> = sqlx::query_as(
            r#"
            SELECT municipality_code, municipality_name, state_code, crop_name, harvested_area, year
            FROM crop_data
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let records: Vec<IngestedRecord> = rows
            .into_iter()
            .map(
                |(municipality_code, municipality_name, state_code, crop_name, harvested_area, year)| {
                    IngestedRecord {
                        municipality_code,
                        municipality_name,
                        state_code,
                        crop_name,
                        harvested_area,
                        year,
                    }
                },
            )
            .collect();

        let (last_update,): (Option<DateTime<Utc>>,) =
            sqlx::query_as("SELECT max(processed_at) FROM processing_logs")
                .fetch_one(&self.pool)
                .await?;

        info!(records = records.len(), "crop index loaded from database");
        Ok(Snapshot::new(build_crop_index(&records), last_update))
    }
}
