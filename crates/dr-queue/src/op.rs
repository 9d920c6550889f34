use dr_proto::{Gulp, Pol};
use thiserror::Error;

/// What kind of command produced an entry. Only [`OpKind::Record`] ever
/// takes part in the writer's start/write/stop lifecycle; `Cancel` and
/// `Delete` are resolved immediately against an existing id and kept only
/// as a short audit trail (see [`crate::RecordingQueue::history`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Record,
    Cancel,
    Delete,
}

/// Metadata passed to a sink's `start`, derived from the sequence header in
/// effect when the writer started the operation (spec §4.4 step 4).
#[derive(Debug, Clone)]
pub struct RecordingMeta {
    pub station: String,
    pub chan0: i64,
    pub navg: i32,
    pub nchan: u32,
    pub chan_bw: f64,
    pub npol: u32,
    pub pols: [Pol; 4],
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("measurement set I/O error: {0}")]
    Io(String),
}

/// The external measurement-set writer this op drives. A concrete
/// implementation lives in `dr-writer`; `dr-queue` only depends on the
/// trait boundary (spec §1 "external collaborators").
pub trait MeasurementSetSink: Send {
    fn start(&mut self, meta: &RecordingMeta) -> Result<(), SinkError>;
    fn write(&mut self, time_tag: i64, gulp: &Gulp, fill_level: f32) -> Result<(), SinkError>;
    fn stop(&mut self) -> Result<(), SinkError>;
    /// Paths of files produced so far, for quota accounting and deletion.
    fn output_paths(&self) -> Vec<std::path::PathBuf>;
}

type SinkFactory = Box<dyn Fn(&str) -> Box<dyn MeasurementSetSink> + Send + Sync>;

/// A scheduled file operation: a recording window plus everything needed
/// to drive the writer's per-gulp protocol against it.
pub struct RecordingOp {
    pub id: u64,
    pub kind: OpKind,
    pub start_utc: f64,
    pub stop_utc: f64,
    pub filename_template: String,
    pub is_started: bool,
    pub is_finished: bool,
    sink_factory: Option<SinkFactory>,
    sink: Option<Box<dyn MeasurementSetSink>>,
}

impl std::fmt::Debug for RecordingOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingOp")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("start_utc", &self.start_utc)
            .field("stop_utc", &self.stop_utc)
            .field("filename_template", &self.filename_template)
            .field("is_started", &self.is_started)
            .field("is_finished", &self.is_finished)
            .finish()
    }
}

/// A cheap, `Clone`-able view of an op with no live sink attached. Returned
/// by [`crate::RecordingQueue::previous`] once an op has been cleaned out
/// of the live schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingOpSnapshot {
    pub id: u64,
    pub kind: OpKind,
    pub start_utc: f64,
    pub stop_utc: f64,
    pub filename_template: String,
    pub is_started: bool,
    pub is_finished: bool,
    pub output_paths: Vec<std::path::PathBuf>,
}

impl RecordingOp {
    pub fn new(
        id: u64,
        start_utc: f64,
        stop_utc: f64,
        filename_template: impl Into<String>,
        sink_factory: impl Fn(&str) -> Box<dyn MeasurementSetSink> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            kind: OpKind::Record,
            start_utc,
            stop_utc,
            filename_template: filename_template.into(),
            is_started: false,
            is_finished: false,
            sink_factory: Some(Box::new(sink_factory)),
            sink: None,
        }
    }

    /// True if `t` (unix seconds) falls within this op's window.
    pub fn covers(&self, t: f64) -> bool {
        t >= self.start_utc && t < self.stop_utc
    }

    /// Starts the underlying sink, allocating it once (Design Note: "lazy
    /// buffer allocation" becomes an explicit per-sequence init block).
    pub fn start(&mut self, meta: &RecordingMeta) -> Result<(), SinkError> {
        if self.is_started {
            return Ok(());
        }
        let filename = render_filename(&self.filename_template, self.start_utc);
        let factory = self
            .sink_factory
            .as_ref()
            .expect("record op always carries a sink factory until started");
        let mut sink = factory(&filename);
        sink.start(meta)?;
        self.sink = Some(sink);
        self.is_started = true;
        Ok(())
    }

    pub fn write(&mut self, time_tag: i64, gulp: &Gulp, fill_level: f32) -> Result<(), SinkError> {
        self.sink
            .as_mut()
            .expect("write called before start")
            .write(time_tag, gulp, fill_level)
    }

    /// Flushes and closes the sink. Idempotent.
    pub fn stop(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.stop() {
                tracing::warn!(op = self.id, error = %e, "error closing measurement set on stop");
            }
        }
        self.is_finished = true;
    }

    pub fn output_paths(&self) -> Vec<std::path::PathBuf> {
        self.sink.as_ref().map(|s| s.output_paths()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> RecordingOpSnapshot {
        RecordingOpSnapshot {
            id: self.id,
            kind: self.kind,
            start_utc: self.start_utc,
            stop_utc: self.stop_utc,
            filename_template: self.filename_template.clone(),
            is_started: self.is_started,
            is_finished: self.is_finished,
            output_paths: self.output_paths(),
        }
    }
}

/// Expands `{start}` in a filename template with the op's start time,
/// formatted as an integer unix-seconds timestamp.
fn render_filename(template: &str, start_utc: f64) -> String {
    template.replace("{start}", &format!("{}", start_utc as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_is_half_open() {
        let sink_factory = |_: &str| -> Box<dyn MeasurementSetSink> { unreachable!() };
        let op = RecordingOp::new(1, 10.0, 20.0, "rec-{start}.ms", sink_factory);
        assert!(!op.covers(9.999));
        assert!(op.covers(10.0));
        assert!(op.covers(19.999));
        assert!(!op.covers(20.0));
    }

    #[test]
    fn render_filename_substitutes_start() {
        assert_eq!(render_filename("rec-{start}.ms", 1_700_000_000.0), "rec-1700000000.ms");
    }
}
