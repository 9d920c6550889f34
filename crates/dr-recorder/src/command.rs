use dr_proto::ShutdownEvent;
use dr_queue::{MeasurementSetSink, RecordingQueue};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// One command the dispatcher can send: record a new window, cancel a
/// not-yet-finished one, or delete a finished one's files (spec §4.4
/// "the command processor calls `enqueue`, `cancel_by_id`, `delete_by_id`").
#[derive(Debug, Clone)]
pub enum Command {
    Record { start_utc: f64, stop_utc: f64, filename_template: String },
    Cancel { id: u64 },
    Delete { id: u64 },
}

/// The command/monitor transport is an external collaborator (spec §1);
/// this is the trait boundary the command stage polls, satisfied by a
/// concrete adapter to the real transport.
pub trait CommandSource: Send {
    /// Returns commands that have arrived since the last call, without
    /// blocking.
    fn poll(&mut self) -> Vec<Command>;
}

/// Test/dev source that never produces a command, matching the "cold
/// start, no commands" end-to-end scenario (spec §8).
#[derive(Debug, Default)]
pub struct NullCommandSource;

impl CommandSource for NullCommandSource {
    fn poll(&mut self) -> Vec<Command> {
        Vec::new()
    }
}

type SinkFactory = Arc<dyn Fn(&str) -> Box<dyn MeasurementSetSink> + Send + Sync>;

/// Drains commands from a [`CommandSource`] and applies them to the
/// shared recording queue (spec §4.4 "command processor").
pub struct CommandStage {
    source: Box<dyn CommandSource>,
    queue: Arc<RecordingQueue>,
    make_sink: SinkFactory,
    poll_interval: Duration,
}

impl CommandStage {
    pub fn new(source: Box<dyn CommandSource>, queue: Arc<RecordingQueue>, make_sink: SinkFactory, poll_interval: Duration) -> Self {
        Self { source, queue, make_sink, poll_interval }
    }

    pub fn run(mut self, shutdown: &ShutdownEvent) -> Result<(), std::convert::Infallible> {
        while !shutdown.is_set() {
            let commands = self.source.poll();
            for command in commands {
                self.apply(command);
            }
            sleep_in_chunks(self.poll_interval, shutdown);
        }
        Ok(())
    }

    fn apply(&self, command: Command) {
        match command {
            Command::Record { start_utc, stop_utc, filename_template } => {
                let make_sink = Arc::clone(&self.make_sink);
                let id = self.queue.enqueue(start_utc, stop_utc, filename_template, move |name| make_sink(name));
                info!(id, start_utc, stop_utc, "scheduled record operation");
            }
            Command::Cancel { id } => match self.queue.cancel_by_id(id, unix_now()) {
                Ok(()) => info!(id, "cancelled operation"),
                Err(e) => warn!(id, error = %e, "cancel failed"),
            },
            Command::Delete { id } => match self.queue.delete_by_id(id) {
                Ok(paths) => {
                    for path in paths {
                        let result = if path.is_dir() { std::fs::remove_dir_all(&path) } else { std::fs::remove_file(&path) };
                        if let Err(e) = result {
                            warn!(path = %path.display(), error = %e, "failed to delete output file");
                        }
                    }
                    info!(id, "deleted operation");
                }
                Err(e) => warn!(id, error = %e, "delete failed"),
            },
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

fn sleep_in_chunks(total: Duration, shutdown: &ShutdownEvent) {
    const STEP: Duration = Duration::from_millis(200);
    let mut remaining = total;
    while remaining > Duration::ZERO && !shutdown.is_set() {
        let chunk = remaining.min(STEP);
        std::thread::sleep(chunk);
        remaining -= chunk;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_queue::SinkError;

    struct NullSink;
    impl MeasurementSetSink for NullSink {
        fn start(&mut self, _meta: &dr_queue::RecordingMeta) -> Result<(), SinkError> {
            Ok(())
        }
        fn write(&mut self, _time_tag: i64, _gulp: &dr_proto::Gulp, _fill_level: f32) -> Result<(), SinkError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
        fn output_paths(&self) -> Vec<std::path::PathBuf> {
            vec![]
        }
    }

    #[test]
    fn record_command_enqueues_an_op() {
        let queue = Arc::new(RecordingQueue::new());
        let make_sink: SinkFactory = Arc::new(|_name: &str| Box::new(NullSink) as Box<dyn MeasurementSetSink>);
        let stage = CommandStage::new(Box::new(NullCommandSource), Arc::clone(&queue), make_sink, Duration::from_millis(10));

        stage.apply(Command::Record { start_utc: 0.0, stop_utc: 10.0, filename_template: "x-{start}.dat".into() });

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancel_of_unknown_id_just_warns() {
        let queue = Arc::new(RecordingQueue::new());
        let make_sink: SinkFactory = Arc::new(|_name: &str| Box::new(NullSink) as Box<dyn MeasurementSetSink>);
        let stage = CommandStage::new(Box::new(NullCommandSource), queue, make_sink, Duration::from_millis(10));

        stage.apply(Command::Cancel { id: 999 });
    }
}
