use crate::cal::CalCache;
use crate::colormap::colorize;
use crate::composite::compose;
use crate::fft::{fftshift, ifft2};
use crate::grid::{grid_visibilities, GridResult};
use crate::seq::SeqState;
use crate::stokes::{stokes_i, stokes_v};
use crate::Gate;
use crate::ImagerError;
use dr_proto::{conjugate_double, normalize, uvw_to_wavelengths, zenith_uvw_meters, AntennaLayout, MonitorPoint, MonitorSink, RawGulp, ShutdownEvent, CHAN_BW, FS};
use dr_ring::ReadStream;
use ndarray::{s, Array2, Array3};
use num_complex::Complex32;
use std::sync::Arc;
use std::time::Duration;

const CADENCE: Duration = Duration::from_secs(60);
/// Imaging uses only the first four channels of the band (spec §4.8
/// "over the first four channels of the band").
const IMAGED_CHANNELS: usize = 4;
/// Baseline selection window, in meters (spec §4.8 "select baselines
/// with 0.1m < |uv| < 250m").
const MIN_UV_M: f64 = 0.1;
const MAX_UV_M: f64 = 250.0;

/// W-projection dirty-image diagnostic (spec §4.8), gated to once a
/// minute like [`crate`]'s sibling monitor stages.
pub struct ImagerStage {
    input: ReadStream<RawGulp>,
    monitor: Arc<dyn MonitorSink>,
    layout: Arc<dyn AntennaLayout>,
    cal: CalCache,
}

impl ImagerStage {
    pub fn new(input: ReadStream<RawGulp>, monitor: Arc<dyn MonitorSink>, layout: Arc<dyn AntennaLayout>, cal: CalCache) -> Self {
        Self { input, monitor, layout, cal }
    }

    pub fn run(mut self, shutdown: &ShutdownEvent) -> Result<(), ImagerError> {
        let mut seq = SeqState::default();
        let mut gate = Gate::new(CADENCE);

        while !shutdown.is_set() {
            let Some(span) = self.input.next_span() else { break };
            let header = seq.observe(&span)?;

            if gate.ready() {
                self.cal.maybe_reload()?;

                let gulp = normalize(&span.payload, header.navg, header.nchan, false);
                let nchan_sel = (header.nchan as usize).min(IMAGED_CHANNELS);
                let bdata: Array3<Complex32> = gulp.data.slice(s![0, .., 0..nchan_sel, ..]).to_owned();

                let sample_time = seq.time_tag as f64 / FS;
                let uvw_m = zenith_uvw_meters(self.layout.as_ref(), sample_time);
                let bdata = conjugate_double(&bdata);

                let caltag = header.cfreq.round() as i64;
                let product = self.cal.product_for(caltag, header.nbl).filter(|p| p.dim() == bdata.dim());
                let calibrated = product.is_some();
                let bdata = match product {
                    Some(product) => apply_calibration(&bdata, product),
                    None => bdata,
                };

                let uvw_full: Vec<[f64; 3]> = (0..bdata.dim().0)
                    .map(|bl| if bl < uvw_m.len() { uvw_m[bl] } else { negate(uvw_m[bl - uvw_m.len()]) })
                    .collect();

                let (uvw_i, vis_i) = select_and_scale(&bdata, &uvw_full, nchan_sel, header.cfreq, &stokes_i(&bdata.view()));
                let (uvw_v, vis_v) = select_and_scale(&bdata, &uvw_full, nchan_sel, header.cfreq, &stokes_v(&bdata.view(), uvw_m.len()));

                let grid_i = grid_visibilities(&uvw_i, &vis_i);
                let grid_v = grid_visibilities(&uvw_v, &vis_v);

                let image_i = dirty_intensity(&grid_i);
                let image_v = dirty_amplitude(&grid_v);

                let composite = compose(
                    &colorize(&image_i),
                    &colorize(&image_v),
                    &format!("{sample_time:.0}"),
                    header.cfreq / 1e6,
                    calibrated,
                );
                self.monitor.publish("diagnostics/image", MonitorPoint::Image(Arc::new(composite)));
            }

            seq.advance(header.navg);
        }
        Ok(())
    }
}

fn negate(uvw: [f64; 3]) -> [f64; 3] {
    [-uvw[0], -uvw[1], -uvw[2]]
}

/// Multiplies every baseline/channel/pol sample by its calibration
/// product (spec §4.8 "Calibration: multiply visibilities by the
/// product matrix").
fn apply_calibration(bdata: &Array3<Complex32>, product: &Array3<Complex32>) -> Array3<Complex32> {
    let (nbl, nchan, npol) = bdata.dim();
    Array3::from_shape_fn((nbl, nchan, npol), |(k, c, p)| bdata[[k, c, p]] * product[[k, c, p]])
}

/// Flattens the `[bl, chan]` grid into parallel `(uvw_wavelengths, vis)`
/// lists, dropping baselines outside `[MIN_UV_M, MAX_UV_M]` (spec §4.8).
/// `vis` must already be laid out baseline-major, channel-minor, matching
/// [`stokes_i`]/[`stokes_v`]'s iteration order.
fn select_and_scale(
    bdata: &Array3<Complex32>,
    uvw_full: &[[f64; 3]],
    nchan_sel: usize,
    cfreq_hz: f64,
    vis: &[Complex32],
) -> (Vec<[f64; 3]>, Vec<Complex32>) {
    let nbl = bdata.dim().0;
    let mut uvw_out = Vec::new();
    let mut vis_out = Vec::new();

    for bl in 0..nbl {
        let uvw_m = uvw_full[bl];
        let dist = (uvw_m[0] * uvw_m[0] + uvw_m[1] * uvw_m[1]).sqrt();
        if !(MIN_UV_M..MAX_UV_M).contains(&dist) {
            continue;
        }
        for c in 0..nchan_sel {
            let freq_hz = cfreq_hz + c as f64 * CHAN_BW;
            uvw_out.push(uvw_to_wavelengths(uvw_m, freq_hz));
            vis_out.push(vis[bl * nchan_sel + c]);
        }
    }
    (uvw_out, vis_out)
}

fn dirty_intensity(result: &GridResult) -> Array2<f32> {
    let image = ifft2(&result.grid);
    let corrected = Array2::from_shape_fn(image.dim(), |(r, c)| image[[r, c]].re * result.correction[[r, c]]);
    fftshift(&corrected)
}

fn dirty_amplitude(result: &GridResult) -> Array2<f32> {
    let image = ifft2(&result.grid);
    let corrected = Array2::from_shape_fn(image.dim(), |(r, c)| image[[r, c]].norm() * result.correction[[r, c]]);
    fftshift(&corrected)
}
