use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no operation with id {0} in the queue")]
    NotFound(u64),
    #[error("operation {0} has already finished")]
    AlreadyFinished(u64),
}
