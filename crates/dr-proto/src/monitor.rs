use std::sync::Arc;

/// One published diagnostic value: the command/monitor transport (spec
/// §1, external collaborator) decides what to do with it. The core only
/// needs a stage-independent value type and a sink trait to publish
/// through.
#[derive(Debug, Clone)]
pub enum MonitorPoint {
    Scalar(f64),
    Vector(Vec<f64>),
    /// A per-stand vector keyed by polarization field, e.g.
    /// `statistics/min` publishing `[("XX", [..]), ("YY", [..])]`
    /// (spec §6 "per-stand vector, field=[XX,YY]").
    FieldVector(Vec<(String, Vec<f64>)>),
    Image(Arc<image::RgbImage>),
    /// A scalar point being retracted (e.g. `latest_frequency` going
    /// `null` at sequence end).
    Cleared,
}

/// Publishing capability every stage that emits diagnostics depends on,
/// satisfied by a concrete adapter to the external command/monitor
/// transport. Object-safe so `dr-recorder` can wire one concrete sink
/// into every stage without generic plumbing.
pub trait MonitorSink: Send + Sync {
    fn publish(&self, name: &str, point: MonitorPoint);
}

/// Test/dev sink that logs every point via `tracing` instead of talking
/// to the real transport.
#[derive(Debug, Default)]
pub struct LoggingMonitorSink;

impl MonitorSink for LoggingMonitorSink {
    fn publish(&self, name: &str, point: MonitorPoint) {
        match point {
            MonitorPoint::Scalar(v) => tracing::debug!(name, value = v, "monitor point"),
            MonitorPoint::Vector(v) => tracing::debug!(name, len = v.len(), "monitor point"),
            MonitorPoint::FieldVector(fields) => {
                for (field, v) in &fields {
                    tracing::debug!(name, field, len = v.len(), "monitor point");
                }
            }
            MonitorPoint::Image(img) => tracing::debug!(name, width = img.width(), height = img.height(), "monitor point"),
            MonitorPoint::Cleared => tracing::debug!(name, "monitor point cleared"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_sink_accepts_every_variant() {
        let sink = LoggingMonitorSink;
        sink.publish("latest_time_tag", MonitorPoint::Scalar(42.0));
        sink.publish("latest_frequency", MonitorPoint::Cleared);
        sink.publish("stand_power", MonitorPoint::Vector(vec![1.0, 2.0]));
    }
}
