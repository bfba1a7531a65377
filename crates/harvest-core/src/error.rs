use thiserror::Error;

/// Source-level failures. These abort a run and are reported in its log entry.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unreadable source {path}: {reason}")]
    UnreadableSource { path: String, reason: String },
}

impl IngestError {
    pub fn unreadable(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::UnreadableSource {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Crop \"{0}\" not found")]
    CropNotFound(String),
    #[error("Municipality \"{0}\" not found")]
    MunicipalityNotFound(String),
}

/// Failures of persistence sinks and index sources.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
