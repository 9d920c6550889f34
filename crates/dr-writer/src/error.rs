use thiserror::Error;

#[derive(Debug, Error)]
pub enum WriteStageError {
    #[error("failed to decode sequence header: {0}")]
    Header(#[source] serde_json::Error),
    #[error("failed to start recording operation: {0}")]
    Start(#[source] dr_queue::SinkError),
    #[error("failed to archive measurement set output: {0}")]
    Archive(#[source] std::io::Error),
}
