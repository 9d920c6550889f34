use thiserror::Error;

/// Error types for ring fabric operations.
#[derive(Debug, Error)]
pub enum RingError {
    /// A writer capability is already held by another thread.
    #[error("ring already has an active writer")]
    AlreadyWriting,
    /// `resize` was called with different values while a writer is active.
    #[error("cannot resize ring while a writer is active")]
    ResizeWhileWriting,
    /// The requested span is larger than the configured `gulp_bytes`.
    #[error("gulp of {requested} bytes exceeds configured capacity of {capacity} bytes")]
    GulpTooLarge { requested: usize, capacity: usize },
    /// The ring has been closed and no further spans will be produced.
    #[error("ring is closed")]
    Closed,
}
