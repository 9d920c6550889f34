use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The single shared shutdown event set by SIGINT/SIGTERM (spec §5
/// "Cancellation"). Every stage loop checks it between gulps (or, for
/// `dr-capture`, between UDP receive timeouts) and drains cleanly rather
/// than being interrupted mid-span.
#[derive(Debug, Default)]
pub struct ShutdownEvent {
    flag: AtomicBool,
}

impl ShutdownEvent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { flag: AtomicBool::new(false) })
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear_and_latches_once_set() {
        let ev = ShutdownEvent::new();
        assert!(!ev.is_set());
        ev.set();
        assert!(ev.is_set());
    }
}
