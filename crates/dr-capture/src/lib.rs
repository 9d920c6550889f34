//! The two gulp producers: [`CaptureProducer`], which ingests live UDP
//! correlator packets, and [`OfflineProducer`], which replays a canned sky
//! model at real-time cadence. Both satisfy [`GulpProducer`].

mod capture;
mod error;
mod npy;
mod offline;
mod producer;
mod wire;

pub use capture::CaptureProducer;
pub use error::CaptureError;
pub use offline::OfflineProducer;
pub use producer::GulpProducer;
