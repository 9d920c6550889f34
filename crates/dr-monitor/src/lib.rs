//! The three diagnostic stages that run alongside the writer: statistics
//! (spec §4.5), spectra (§4.6), and baseline amplitude (§4.7). Each reads
//! its own [`dr_ring::ReadStream`] independently of the writer and of
//! each other, gated to a once-a-minute cadence via [`Gate`].

mod baseline;
mod error;
mod gate;
mod seq;
mod statistics;
mod spectra;

pub use baseline::BaselineStage;
pub use error::MonitorError;
pub use gate::Gate;
pub use spectra::SpectraStage;
pub use statistics::StatisticsStage;
