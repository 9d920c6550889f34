use std::collections::VecDeque;
use std::sync::Mutex;

const CAPACITY: usize = 1000;

/// Bounded side channel for per-gulp fill-level samples.
///
/// Publication is non-blocking and drops the newest sample when the queue is
/// already at capacity, matching the capture producer's "best effort"
/// delivery: a stalled consumer should never back-pressure packet capture.
#[derive(Debug, Default)]
pub struct FillLevelQueue {
    samples: Mutex<VecDeque<f32>>,
}

impl FillLevelQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self { samples: Mutex::new(VecDeque::with_capacity(CAPACITY)) }
    }

    /// Publishes a fill-level sample, dropping it silently if the queue is
    /// already full.
    pub fn publish(&self, fill_level: f32) {
        let mut samples = self.samples.lock().unwrap();
        if samples.len() < CAPACITY {
            samples.push_back(fill_level);
        }
    }

    /// Pops the oldest sample, if any, without blocking.
    pub fn try_pop(&self) -> Option<f32> {
        self.samples.lock().unwrap().pop_front()
    }

    /// Number of samples currently queued.
    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_newest_when_full() {
        let q = FillLevelQueue::new();
        for i in 0..CAPACITY {
            q.publish(i as f32 / CAPACITY as f32);
        }
        assert_eq!(q.len(), CAPACITY);
        q.publish(0.999);
        // the queue was full, so the new sample was dropped
        assert_eq!(q.len(), CAPACITY);
        assert_eq!(q.try_pop(), Some(0.0));
    }

    #[test]
    fn pop_empty_returns_none() {
        let q = FillLevelQueue::new();
        assert_eq!(q.try_pop(), None);
    }
}
