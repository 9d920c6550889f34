use crate::{npy, CaptureError, GulpProducer};
use dr_proto::{RawGulp, ShutdownEvent, SequenceHeader, CHAN_BW};
use dr_ring::Ring;
use dr_ring::FillLevelQueue;
use ndarray::{Array3, Array4};
use num_complex::Complex;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Target amplitude the sky model is scaled to before noise is added,
/// per spec §4.3.
const SKY_SCALE: f32 = 1000.0;
/// Standard deviation of the injected Gaussian noise, per spec §4.3.
const NOISE_SIGMA: f32 = 10.0;
/// Re-checked between sleep increments so shutdown is observed promptly
/// even when a gulp's real-time cadence is long.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(100);

/// Drop-in replacement for [`crate::CaptureProducer`] that synthesizes
/// gulps from a canned sky model at the correlator's real-time cadence,
/// for replay and test use (spec §4.3).
pub struct OfflineProducer {
    ring: Arc<Ring<RawGulp>>,
    fill: Arc<FillLevelQueue>,
    sky_model: Array3<Complex<f32>>,
    header: SequenceHeader,
    ntime_gulp: usize,
}

impl OfflineProducer {
    /// `sky_model_path` is the optional `.npy` file shaped `[nbl, nchan,
    /// 4]`; when absent the sky model is all zeros (noise only).
    pub fn new(
        sky_model_path: Option<PathBuf>,
        nstand: u32,
        nchan: u32,
        navg: i32,
        chan0: i64,
        fast: bool,
        ntime_gulp: usize,
        ring: Arc<Ring<RawGulp>>,
        fill: Arc<FillLevelQueue>,
    ) -> Result<Self, CaptureError> {
        let nbl = SequenceHeader::baseline_count(nstand);
        let sky_model = match sky_model_path {
            Some(path) => {
                let model = npy::load_sky_model(&path, (nbl as usize, nchan as usize, 4))?;
                model.mapv(|c| c * SKY_SCALE)
            }
            None => Array3::<Complex<f32>>::zeros((nbl as usize, nchan as usize, 4)),
        };
        let header = SequenceHeader::from_first_packet(0, 0, chan0, nchan, navg, nbl, fast);
        Ok(Self { ring, fill, sky_model, header, ntime_gulp })
    }

    fn synth_gulp(&self) -> RawGulp {
        let (nbl, nchan, npol) = self.sky_model.dim();
        let mut rng = rand::thread_rng();
        let mut data = Array4::<Complex<i32>>::zeros((self.ntime_gulp, nbl, nchan, npol));
        for t in 0..self.ntime_gulp {
            for b in 0..nbl {
                for c in 0..nchan {
                    for p in 0..npol {
                        let base = self.sky_model[[b, c, p]];
                        let re = base.re + gaussian(&mut rng, NOISE_SIGMA);
                        let im = base.im + gaussian(&mut rng, NOISE_SIGMA);
                        data[[t, b, c, p]] = Complex::new(re as i32, im as i32);
                    }
                }
            }
        }
        RawGulp { data }
    }

    fn sleep_for_cadence(&self, shutdown: &ShutdownEvent) {
        let tgulp = Duration::from_secs_f64(self.ntime_gulp as f64 * f64::from(self.header.navg) / CHAN_BW);
        let deadline = Instant::now() + tgulp;
        while Instant::now() < deadline {
            if shutdown.is_set() {
                return;
            }
            std::thread::sleep(SLEEP_GRANULARITY.min(deadline - Instant::now()));
        }
    }
}

/// Box-Muller Gaussian sample with the given standard deviation.
fn gaussian(rng: &mut impl Rng, sigma: f32) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen_range(0.0..1.0);
    let r = (-2.0 * u1.ln()).sqrt();
    sigma * r * (std::f32::consts::TAU * u2).cos()
}

impl GulpProducer for OfflineProducer {
    fn run(&mut self, shutdown: &ShutdownEvent) -> Result<(), CaptureError> {
        let writer = self.ring.begin_writing()?;
        info!(chan0 = self.header.chan0, nchan = self.header.nchan, "starting offline sequence");
        let header_bytes = self.header.to_json().map_err(CaptureError::Header)?;
        let seq = writer.begin_sequence(header_bytes);

        loop {
            if shutdown.is_set() {
                break;
            }
            let gulp = self.synth_gulp();
            let size = gulp.data.len() * std::mem::size_of::<Complex<i32>>();
            let mut span = seq.reserve(size)?;
            span.write(gulp);
            drop(span);
            self.fill.publish(1.0);
            self.sleep_for_cadence(shutdown);
        }
        drop(seq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_ring::RingConfig;

    #[test]
    fn zero_sky_model_plus_noise_stays_near_zero_mean() {
        let ring = Ring::new(RingConfig::new(1 << 16, 4));
        let fill = Arc::new(FillLevelQueue::new());
        let producer = OfflineProducer::new(None, 4, 2, 24, 100, false, 2, ring, fill).unwrap();
        let gulp = producer.synth_gulp();
        let mean: f64 = gulp
            .data
            .iter()
            .map(|c| f64::from(c.re).abs() + f64::from(c.im).abs())
            .sum::<f64>()
            / (gulp.data.len() * 2) as f64;
        // noise sigma is 10, so the mean absolute value should be small
        // multiples of sigma, not thousands (which would indicate the
        // sky-model scale leaked in despite no file being given)
        assert!(mean < 100.0, "mean abs sample {mean} too large for noise-only gulp");
    }
}
