use crate::error::QueueError;
use crate::op::{MeasurementSetSink, OpKind, RecordingMeta, RecordingOp, RecordingOpSnapshot};
use std::collections::VecDeque;
use std::sync::Mutex;

const HISTORY_DEPTH: usize = 32;

struct Inner {
    ops: VecDeque<RecordingOp>,
    previous: Option<RecordingOpSnapshot>,
    history: VecDeque<RecordingOpSnapshot>,
    lag: f64,
    next_id: u64,
}

/// The command-driven, time-ordered schedule of file operations that
/// governs when the writer opens, appends to, and closes measurement-set
/// files (spec §4.4).
///
/// Mutated from two threads (the command processor and the writer); every
/// access goes through the internal mutex. [`RecordingQueue::with_active`]
/// hands the writer a mutable borrow of the active op for the lifetime of
/// the lock, matching spec §5's "handle whose lifetime is bounded by the
/// lock" requirement.
pub struct RecordingQueue {
    inner: Mutex<Inner>,
}

impl Default for RecordingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ops: VecDeque::new(),
                previous: None,
                history: VecDeque::new(),
                lag: 0.0,
                next_id: 1,
            }),
        }
    }

    /// Schedules a new record operation, keeping the queue ordered by
    /// `start_utc`. Returns the assigned id.
    pub fn enqueue(
        &self,
        start_utc: f64,
        stop_utc: f64,
        filename_template: impl Into<String>,
        sink_factory: impl Fn(&str) -> Box<dyn MeasurementSetSink> + Send + Sync + 'static,
    ) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        let op = RecordingOp::new(id, start_utc, stop_utc, filename_template, sink_factory);
        let pos = inner.ops.partition_point(|o| o.start_utc <= op.start_utc);
        inner.ops.insert(pos, op);
        id
    }

    /// Cancels a not-yet-started op outright, or truncates an active op's
    /// window to `now` so the writer closes it on the next gulp.
    pub fn cancel_by_id(&self, id: u64, now: f64) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.ops.iter().position(|o| o.id == id).ok_or(QueueError::NotFound(id))?;
        if inner.ops[idx].is_finished {
            return Err(QueueError::AlreadyFinished(id));
        }
        if inner.ops[idx].is_started {
            inner.ops[idx].stop_utc = now;
        } else {
            inner.ops.remove(idx);
        }
        inner.history.push_back(RecordingOpSnapshot {
            id,
            kind: OpKind::Cancel,
            start_utc: now,
            stop_utc: now,
            filename_template: String::new(),
            is_started: false,
            is_finished: true,
            output_paths: vec![],
        });
        if inner.history.len() > HISTORY_DEPTH {
            inner.history.pop_front();
        }
        Ok(())
    }

    /// Removes a finished op's bookkeeping and returns the file paths it
    /// produced, for the caller to unlink from disk.
    pub fn delete_by_id(&self, id: u64) -> Result<Vec<std::path::PathBuf>, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.ops.iter().position(|o| o.id == id);
        let paths = if let Some(idx) = idx {
            if inner.ops[idx].is_started && !inner.ops[idx].is_finished {
                return Err(QueueError::NotFound(id));
            }
            let op = inner.ops.remove(idx).unwrap();
            op.output_paths()
        } else if inner.previous.as_ref().map(|p| p.id) == Some(id) {
            let snap = inner.previous.take().unwrap();
            snap.output_paths
        } else {
            return Err(QueueError::NotFound(id));
        };
        inner.history.push_back(RecordingOpSnapshot {
            id,
            kind: OpKind::Delete,
            start_utc: 0.0,
            stop_utc: 0.0,
            filename_template: String::new(),
            is_started: false,
            is_finished: true,
            output_paths: vec![],
        });
        if inner.history.len() > HISTORY_DEPTH {
            inner.history.pop_front();
        }
        Ok(paths)
    }

    /// Records the current pipeline-to-wall-clock offset
    /// (`wall_now - sample_now`), used to align `active()` to data arrival.
    pub fn update_lag(&self, lag: f64) {
        self.inner.lock().unwrap().lag = lag;
    }

    pub fn lag(&self) -> f64 {
        self.inner.lock().unwrap().lag
    }

    /// Runs `f` against the op (if any) whose window covers `wall_now -
    /// lag` and which has not finished. At most one op can ever match
    /// (spec invariant: never two overlapping windows).
    pub fn with_active<R>(&self, wall_now: f64, f: impl FnOnce(&mut RecordingOp) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        let lag = inner.lag;
        let effective_now = wall_now - lag;
        let idx = inner
            .ops
            .iter()
            .position(|o| !o.is_finished && o.covers(effective_now))?;
        Some(f(&mut inner.ops[idx]))
    }

    /// True if some op currently matches `wall_now - lag` and is not
    /// finished.
    pub fn has_active(&self, wall_now: f64) -> bool {
        let inner = self.inner.lock().unwrap();
        let lag = inner.lag;
        let effective_now = wall_now - lag;
        inner.ops.iter().any(|o| !o.is_finished && o.covers(effective_now))
    }

    /// Drops finished ops from the live schedule, promoting the most
    /// recently finished one to [`RecordingQueue::previous`].
    ///
    /// An op only ever has `is_finished` set by [`RecordingOp::stop`], which
    /// nothing calls until `clean` itself does it here — so in addition to
    /// already-finished ops, this also stops (and promotes) a started op
    /// whose window has elapsed under `wall_now - lag` (spec §4.4 step 5:
    /// the writer's transition from active to idle is what's supposed to
    /// close the file).
    pub fn clean(&self, wall_now: f64) {
        let mut inner = self.inner.lock().unwrap();
        let effective_now = wall_now - inner.lag;
        while let Some(front) = inner.ops.front() {
            let elapsed = front.is_started && !front.covers(effective_now);
            if !front.is_finished && !elapsed {
                break;
            }
            let mut op = inner.ops.pop_front().unwrap();
            op.stop();
            inner.previous = Some(op.snapshot());
        }
    }

    pub fn previous(&self) -> Option<RecordingOpSnapshot> {
        self.inner.lock().unwrap().previous.clone()
    }

    pub fn history(&self) -> Vec<RecordingOpSnapshot> {
        self.inner.lock().unwrap().history.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::SinkError;
    use dr_proto::Gulp;

    struct NullSink;
    impl MeasurementSetSink for NullSink {
        fn start(&mut self, _meta: &RecordingMeta) -> Result<(), SinkError> {
            Ok(())
        }
        fn write(&mut self, _time_tag: i64, _gulp: &Gulp, _fill_level: f32) -> Result<(), SinkError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
        fn output_paths(&self) -> Vec<std::path::PathBuf> {
            vec![]
        }
    }

    fn factory(_: &str) -> Box<dyn MeasurementSetSink> {
        Box::new(NullSink)
    }

    #[test]
    fn at_most_one_active_op_for_overlapping_schedule_attempt() {
        let q = RecordingQueue::new();
        q.enqueue(0.0, 10.0, "a-{start}.ms", factory);
        // A second op scheduled to start exactly when the first ends must
        // not be simultaneously active with it (half-open windows).
        q.enqueue(10.0, 20.0, "b-{start}.ms", factory);

        assert!(q.with_active(5.0, |_| ()).is_some());
        assert!(q.with_active(15.0, |_| ()).is_some());
        // at the boundary only the second op (half-open on the low end) matches
        let mut count = 0;
        for t in [9.999, 10.0, 10.001] {
            if q.has_active(t) {
                count += 1;
            }
        }
        assert_eq!(count, 3);
    }

    #[test]
    fn clean_promotes_finished_op_to_previous() {
        let q = RecordingQueue::new();
        let id = q.enqueue(0.0, 1.0, "a-{start}.ms", factory);
        q.with_active(0.5, |op| op.start(&RecordingMeta {
            station: "ovro".into(),
            chan0: 0,
            navg: 24,
            nchan: 1,
            chan_bw: 23_925.78125,
            npol: 4,
            pols: [dr_proto::Pol::Xx, dr_proto::Pol::Xy, dr_proto::Pol::Yx, dr_proto::Pol::Yy],
        }).unwrap());
        assert!(q.previous().is_none());
        // The op's window ends at 1.0; once wall-clock has moved past it
        // without a new `with_active` call keeping it alive, `clean` alone
        // must notice it elapsed, stop it, and promote it.
        q.clean(1.5);
        let prev = q.previous().unwrap();
        assert_eq!(prev.id, id);
        assert!(prev.is_finished);
    }

    #[test]
    fn clean_leaves_a_not_yet_started_op_alone() {
        let q = RecordingQueue::new();
        q.enqueue(100.0, 200.0, "a-{start}.ms", factory);
        q.clean(50.0);
        assert_eq!(q.len(), 1);
        assert!(q.previous().is_none());
    }

    #[test]
    fn cancel_unstarted_op_removes_it() {
        let q = RecordingQueue::new();
        let id = q.enqueue(100.0, 200.0, "a-{start}.ms", factory);
        q.cancel_by_id(id, 0.0).unwrap();
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn cancel_unknown_id_errors() {
        let q = RecordingQueue::new();
        assert!(matches!(q.cancel_by_id(999, 0.0), Err(QueueError::NotFound(999))));
    }
}
