//! Time-ordered recording operation queue and quota-duration parsing.

mod error;
mod op;
mod quota;
mod queue;

pub use error::QueueError;
pub use op::{MeasurementSetSink, OpKind, RecordingMeta, RecordingOp, RecordingOpSnapshot, SinkError};
pub use quota::quota_size;
pub use queue::RecordingQueue;
