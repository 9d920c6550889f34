use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("failed to decode sequence header: {0}")]
    Header(#[from] serde_json::Error),
}
