//! The gulp ring fabric.
//!
//! A named, bounded, in-process buffer of fixed-size "gulp" frames with
//! single-writer / multi-reader semantics: one thread holds the writer
//! capability and pushes gulps belonging to a single active sequence at a
//! time, while any number of independent readers stream committed spans at
//! their own pace.
//!
//! This is a ring-decomposed broadcast log rather than the classic SPSC
//! ring this crate's sibling designs are known for: a single producer still
//! owns the tail, but every reader owns its own head, so no reader can
//! starve another. See [`Ring::read`] for the per-reader cursor contract
//! and [`Ring::reserve`] for the `guarantee` backpressure mode.

mod config;
mod error;
mod fill;
mod header;
mod ring;

pub use config::RingConfig;
pub use error::RingError;
pub use fill::FillLevelQueue;
pub use header::{SequenceHeader, CHAN_BW, FS};
pub use ring::{ReadStream, Reservation, Ring, SequenceGuard, Span, WriterGuard};
