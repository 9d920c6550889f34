use crate::WriteStageError;
use dr_proto::{normalize, MonitorPoint, MonitorSink, Pol, RawGulp, SequenceHeader, ShutdownEvent, CHAN_BW};
use dr_queue::{RecordingMeta, RecordingQueue, SinkError};
use dr_ring::{FillLevelQueue, ReadStream};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

/// A write error and a start error behave differently (spec §4.4): start
/// failures are not retried, write failures are throttled and retried on
/// every subsequent gulp.
enum StepError {
    Start(SinkError),
    Write(SinkError),
}

fn unix_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs_f64()
}

/// The writer stage: for each gulp, normalizes it, peeks the fill-level
/// side channel, and drives the recording queue's start/write/stop
/// lifecycle (spec §4.4).
pub struct WriterStage {
    input: ReadStream<RawGulp>,
    queue: Arc<RecordingQueue>,
    fill: Arc<FillLevelQueue>,
    monitor: Arc<dyn MonitorSink>,
    station: String,
    fast: bool,
}

impl WriterStage {
    pub fn new(
        input: ReadStream<RawGulp>,
        queue: Arc<RecordingQueue>,
        fill: Arc<FillLevelQueue>,
        monitor: Arc<dyn MonitorSink>,
        station: String,
        fast: bool,
    ) -> Self {
        Self { input, queue, fill, monitor, station, fast }
    }

    pub fn run(mut self, shutdown: &ShutdownEvent) -> Result<(), WriteStageError> {
        let mut was_active = false;
        let mut time_tag = 0i64;
        let mut navg = 0i32;
        let mut nchan = 0u32;
        let mut chan_bw = 0.0f64;
        let mut chan0 = 0i64;
        let mut write_error_asserted = false;
        let mut write_error_counter = 0u32;
        let mut seen_any_sequence = false;

        while !shutdown.is_set() {
            let Some(span) = self.input.next_span() else { break };

            let header = SequenceHeader::from_json(&span.header).map_err(WriteStageError::Header)?;

            if span.first_of_sequence {
                if seen_any_sequence {
                    self.monitor.publish("latest_frequency", MonitorPoint::Cleared);
                }
                seen_any_sequence = true;
                info!(time_tag = header.time_tag, chan0 = header.chan0, "writer: start of new sequence");

                time_tag = header.time_tag;
                navg = header.navg;
                nchan = header.nchan;
                chan0 = header.chan0;
                chan_bw = header.bw / f64::from(header.nchan);
                write_error_asserted = false;
                write_error_counter = 0;

                let lag = unix_now() - header.unix_time(0);
                self.queue.update_lag(lag);
                info!(lag, "current pipeline lag");

                self.monitor.publish("latest_frequency", MonitorPoint::Scalar(chan0 as f64 * CHAN_BW));
            }

            let gulp = normalize(&span.payload, navg, nchan, self.fast);

            let fill_level = self.fill.try_pop().unwrap_or_else(|| {
                warn!("failed to get integration fill level");
                -1.0
            });

            let meta = RecordingMeta {
                station: self.station.clone(),
                chan0,
                navg,
                nchan,
                chan_bw,
                npol: 4,
                pols: Pol::ALL,
            };

            let wall_now = unix_now();
            let outcome = self.queue.with_active(wall_now, |op| -> Result<(), StepError> {
                if !op.is_started {
                    info!(id = op.id, "started operation");
                    op.start(&meta).map_err(StepError::Start)?;
                }
                op.write(time_tag, &gulp, fill_level).map_err(StepError::Write)
            });

            match outcome {
                Some(Ok(())) => {
                    was_active = true;
                    if write_error_asserted {
                        write_error_asserted = false;
                        info!(count = write_error_counter, "write error de-asserted");
                        write_error_counter = 0;
                    }
                    if !self.fast {
                        self.monitor.publish("latest_time_tag", MonitorPoint::Scalar(time_tag as f64));
                    }
                }
                Some(Err(StepError::Start(e))) => return Err(WriteStageError::Start(e)),
                Some(Err(StepError::Write(e))) => {
                    was_active = true;
                    if !write_error_asserted {
                        write_error_asserted = true;
                        error!(error = %e, "write error asserted");
                    }
                    write_error_counter += 1;
                    if write_error_counter % 50 == 0 {
                        error!(count = write_error_counter, error = %e, "write error re-asserted");
                    }
                }
                None => {
                    if was_active {
                        was_active = false;
                        self.queue.clean(wall_now);
                        info!("ended operation");
                    }
                }
            }

            time_tag += navg;
        }

        if seen_any_sequence {
            self.monitor.publish("latest_frequency", MonitorPoint::Cleared);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_proto::LoggingMonitorSink;
    use dr_queue::MeasurementSetSink;
    use dr_ring::{Ring, RingConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        writes: Arc<AtomicUsize>,
    }

    impl MeasurementSetSink for CountingSink {
        fn start(&mut self, _meta: &RecordingMeta) -> Result<(), SinkError> {
            Ok(())
        }
        fn write(&mut self, _time_tag: i64, _gulp: &dr_proto::Gulp, _fill_level: f32) -> Result<(), SinkError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
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
    fn writes_one_gulp_per_span_while_an_op_is_active() {
        let ring = Ring::new(RingConfig::new(1 << 20, 4));
        let reader = ring.read(true);
        let queue = Arc::new(RecordingQueue::new());
        let fill = Arc::new(FillLevelQueue::new());
        let monitor: Arc<dyn MonitorSink> = Arc::new(LoggingMonitorSink);

        let writes = Arc::new(AtomicUsize::new(0));
        let writes_for_factory = Arc::clone(&writes);
        queue.enqueue(0.0, 1e12, "a-{start}.ms", move |_| {
            Box::new(CountingSink { writes: writes_for_factory.clone() }) as Box<dyn MeasurementSetSink>
        });

        let writer_ring = Arc::clone(&ring);
        let hdr = dr_proto::SequenceHeader::from_first_packet(0, 0, 100, 2, 24, 3, false);

        let producer = std::thread::spawn(move || {
            let w = writer_ring.begin_writing().unwrap();
            let seq = w.begin_sequence(hdr.to_json().unwrap());
            for _ in 0..3 {
                let raw = dr_proto::RawGulp { data: ndarray::Array4::zeros((1, 3, 2, 4)) };
                let size = raw.data.len() * std::mem::size_of::<num_complex::Complex<i32>>();
                let mut span = seq.reserve(size).unwrap();
                span.write(raw);
            }
            drop(seq);
            ring.close();
        });
        producer.join().unwrap();

        let stage = WriterStage::new(reader, queue, fill, monitor, "ovro".into(), false);
        let shutdown = ShutdownEvent::new();
        stage.run(&shutdown).unwrap();

        assert_eq!(writes.load(Ordering::SeqCst), 3);
    }
}
