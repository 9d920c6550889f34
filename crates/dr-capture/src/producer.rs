use crate::CaptureError;
use dr_proto::ShutdownEvent;

/// The capability both [`crate::CaptureProducer`] and [`crate::OfflineProducer`]
/// satisfy: emit a sequence header, then stream gulps into a ring until
/// shutdown or a hard error, per spec's "Polymorphism" design note — a
/// small capability interface rather than an inheritance hierarchy.
pub trait GulpProducer {
    /// Runs the producer to completion. Returns `Ok(())` on a clean,
    /// cooperative shutdown; `Err` only for a hard, unrecoverable fault.
    fn run(&mut self, shutdown: &ShutdownEvent) -> Result<(), CaptureError>;
}
