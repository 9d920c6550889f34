use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("failed to scan recording directory {path}: {source}")]
    Scan { path: String, #[source] source: std::io::Error },
    #[error("failed to delete {path}: {source}")]
    Delete { path: String, #[source] source: std::io::Error },
}
