use std::time::{Duration, Instant};

/// Wall-clock rate limiter, the same once-per-interval pattern the
/// statistics/spectra/baseline stages use: the imager redoes its
/// expensive gridding-and-FFT work only when [`Gate::ready`] returns
/// true, while the sequence's `time_tag` still advances on every gulp.
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
