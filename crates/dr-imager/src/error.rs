use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImagerError {
    #[error("failed to decode sequence header: {0}")]
    Header(#[from] serde_json::Error),
    #[error("failed to read calibration table {path}: {source}")]
    CalTable { path: String, #[source] source: std::io::Error },
    #[error("malformed calibration table {path}: {reason}")]
    CalFormat { path: String, reason: String },
    #[error("failed to scan calibration directory: {0}")]
    CalDir(#[source] std::io::Error),
}
