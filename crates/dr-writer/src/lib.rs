//! The writer stage: normalizes gulps, drives the recording queue's
//! start/write/stop lifecycle, and surfaces persistent write-error state.

mod archive;
mod error;
mod writer;

pub use archive::ArchivingSink;
pub use error::WriteStageError;
pub use writer::WriterStage;
