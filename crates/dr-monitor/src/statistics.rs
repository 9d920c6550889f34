use crate::seq::SeqState;
use crate::Gate;
use dr_proto::{auto_baseline_index, normalize, MonitorPoint, MonitorSink, Pol, RawGulp, ShutdownEvent};
use dr_ring::ReadStream;
use std::sync::Arc;
use std::time::Duration;

const CADENCE: Duration = Duration::from_secs(60);

/// Per-stand min/avg/max auto-correlation power for XX and YY, emitted
/// once a minute (spec §4.5).
pub struct StatisticsStage {
    input: ReadStream<RawGulp>,
    monitor: Arc<dyn MonitorSink>,
}

impl StatisticsStage {
    pub fn new(input: ReadStream<RawGulp>, monitor: Arc<dyn MonitorSink>) -> Self {
        Self { input, monitor }
    }

    pub fn run(mut self, shutdown: &ShutdownEvent) -> Result<(), crate::MonitorError> {
        let mut seq = SeqState::default();
        let mut gate = Gate::new(CADENCE);

        while !shutdown.is_set() {
            let Some(span) = self.input.next_span() else { break };
            let header = seq.observe(&span)?;

            if gate.ready() {
                let gulp = normalize(&span.payload, header.navg, header.nchan, false);
                let (min, avg, max) = per_stand_stats(&gulp, header.nstand);
                self.monitor.publish("statistics/min", MonitorPoint::FieldVector(min));
                self.monitor.publish("statistics/avg", MonitorPoint::FieldVector(avg));
                self.monitor.publish("statistics/max", MonitorPoint::FieldVector(max));
            }

            seq.advance(header.navg);
        }
        Ok(())
    }
}

type FieldStats = Vec<(String, Vec<f64>)>;

/// Computes per-stand min/avg/max of the real part of the XX/YY
/// auto-correlation across every channel and time step in the gulp.
fn per_stand_stats(gulp: &dr_proto::Gulp, nstand: u32) -> (FieldStats, FieldStats, FieldStats) {
    let mut mins = Vec::new();
    let mut avgs = Vec::new();
    let mut maxs = Vec::new();

    for pol in [Pol::Xx, Pol::Yy] {
        let mut min_v = Vec::with_capacity(nstand as usize);
        let mut avg_v = Vec::with_capacity(nstand as usize);
        let mut max_v = Vec::with_capacity(nstand as usize);
        for i in 0..nstand {
            let bl = auto_baseline_index(i, nstand) as usize;
            let values: Vec<f64> = gulp
                .data
                .slice(ndarray::s![.., bl, .., pol.index()])
                .iter()
                .map(|c| f64::from(c.re))
                .collect();
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
            min_v.push(min);
            avg_v.push(avg);
            max_v.push(max);
        }
        mins.push((pol.label().to_string(), min_v));
        avgs.push((pol.label().to_string(), avg_v));
        maxs.push((pol.label().to_string(), max_v));
    }

    (mins, avgs, maxs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_proto::{Gulp, SequenceHeader};
    use ndarray::Array4;
    use num_complex::Complex;

    #[test]
    fn per_stand_stats_reports_exactly_nstand_entries_per_pol() {
        let hdr = SequenceHeader::from_first_packet(0, 0, 0, 4, 24, 6, false); // nstand=3
        let data = Array4::from_elem((1, 6, 4, 4), Complex::new(5.0f32, 0.0));
        let gulp = Gulp { data };
        let (min, avg, max) = per_stand_stats(&gulp, hdr.nstand);
        for field in [&min, &avg, &max] {
            assert_eq!(field.len(), 2); // XX, YY
            for (_, v) in field {
                assert_eq!(v.len(), 3);
            }
        }
        assert!((avg[0].1[0] - 5.0).abs() < 1e-6);
    }
}
