use thiserror::Error;

/// Errors surfaced by a [`crate::GulpProducer`].
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to bind capture socket: {0}")]
    Bind(#[source] std::io::Error),
    #[error("capture device reported a hard error: {0}")]
    Io(#[source] std::io::Error),
    #[error("failed to serialize sequence header: {0}")]
    Header(#[source] serde_json::Error),
    #[error(transparent)]
    Ring(#[from] dr_ring::RingError),
    #[error("sky model file is malformed: {0}")]
    SkyModel(String),
}
