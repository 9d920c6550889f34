use std::time::{Duration, Instant};

/// Wall-clock rate limiter: every diagnostic stage does its expensive
/// per-minute work only when [`Gate::ready`] returns true, but still
/// advances its own per-gulp bookkeeping on every gulp (spec §4.5
/// "advance `time_tag` per gulp regardless of emission").
pub struct Gate {
    interval: Duration,
    last: Option<Instant>,
}

impl Gate {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True at most once per `interval`; always true the first call.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_then_waits_for_the_interval() {
        let mut gate = Gate::new(Duration::from_secs(60));
        assert!(gate.ready());
        assert!(!gate.ready());
    }
}
