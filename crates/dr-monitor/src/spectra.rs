use dr_proto::label::{draw_text, text_height, text_width};
use crate::seq::SeqState;
use crate::Gate;
use dr_proto::{auto_baseline_index, normalize, Gulp, MonitorPoint, MonitorSink, Pol, RawGulp, ShutdownEvent};
use dr_ring::ReadStream;
use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const CADENCE: Duration = Duration::from_secs(60);
const GRID_COLS: u32 = 20;
const GRID_ROWS: u32 = 18;
const PANEL: u32 = 64;
const HEADER: u32 = 10;

const XX_COLOR: Rgb<u8> = Rgb([217, 95, 2]);
const YY_COLOR: Rgb<u8> = Rgb([27, 158, 119]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS_COLOR: Rgb<u8> = Rgb([180, 180, 180]);
const TEXT_COLOR: Rgb<u8> = Rgb([60, 60, 60]);

/// Per-minute grid of per-stand auto-spectra panels (spec §4.6).
pub struct SpectraStage {
    input: ReadStream<RawGulp>,
    monitor: Arc<dyn MonitorSink>,
}

impl SpectraStage {
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
                let img = render_spectra_grid(&gulp, header.nstand);
                self.monitor.publish("diagnostics/spectra", MonitorPoint::Image(Arc::new(img)));
            }

            seq.advance(header.navg);
        }
        Ok(())
    }
}

/// `10*log10(|c|)` in dB, with a floor to avoid `-inf` for exact zeros.
fn db(c: num_complex::Complex<f32>) -> f32 {
    let mag2 = c.norm_sqr().max(1e-12);
    10.0 * mag2.log10()
}

fn render_spectra_grid(gulp: &Gulp, nstand: u32) -> RgbImage {
    let width = GRID_COLS * PANEL;
    let height = GRID_ROWS * PANEL + HEADER;
    let mut img = RgbImage::from_pixel(width, height, WHITE);

    let (_, _, nchan, _) = gulp.data.dim();

    // Collect per-stand, per-channel dB series for both pols, and the
    // global dB range used to scale every panel identically.
    let mut db_min = f32::INFINITY;
    let mut db_max = f32::NEG_INFINITY;
    let mut series: Vec<(Vec<f32>, Vec<f32>)> = Vec::with_capacity(nstand as usize);
    for i in 0..nstand.min(GRID_COLS * GRID_ROWS) {
        let bl = auto_baseline_index(i, nstand) as usize;
        let xx: Vec<f32> = (0..nchan).map(|c| db(gulp.data[[0, bl, c, Pol::Xx.index()]])).collect();
        let yy: Vec<f32> = (0..nchan).map(|c| db(gulp.data[[0, bl, c, Pol::Yy.index()]])).collect();
        for v in xx.iter().chain(yy.iter()) {
            db_min = db_min.min(*v);
            db_max = db_max.max(*v);
        }
        series.push((xx, yy));
    }
    if !db_min.is_finite() || !db_max.is_finite() || (db_max - db_min).abs() < 1e-6 {
        db_min = 0.0;
        db_max = 1.0;
    }

    for (i, (xx, yy)) in series.iter().enumerate() {
        let col = i as u32 % GRID_COLS;
        let row = i as u32 / GRID_COLS;
        let x0 = col * PANEL;
        let y0 = HEADER + row * PANEL;
        draw_panel(&mut img, x0, y0, i as u32, xx, yy, db_min, db_max);
    }

    let unix_now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    draw_text(&mut img, 2, 1, &format!("UTC {unix_now}"), TEXT_COLOR);
    let range_label = format!("{:.0}-{:.0}DB", db_min, db_max);
    draw_text(&mut img, width as i32 - text_width(&range_label) as i32 - 2, 1, &range_label, TEXT_COLOR);
    let legend = "XX YY";
    draw_text(&mut img, width as i32 / 2 - text_width(legend) as i32 / 2, 1, legend, XX_COLOR);

    img
}

#[allow(clippy::too_many_arguments)]
fn draw_panel(img: &mut RgbImage, x0: u32, y0: u32, stand: u32, xx: &[f32], yy: &[f32], db_min: f32, db_max: f32) {
    use imageproc::drawing::draw_line_segment_mut;

    // baseline axis
    draw_line_segment_mut(
        img,
        (x0 as f32, (y0 + PANEL - 1) as f32),
        ((x0 + PANEL - 1) as f32, (y0 + PANEL - 1) as f32),
        AXIS_COLOR,
    );

    let plot_h = PANEL.saturating_sub(text_height() + 2) as f32;
    let scale = |v: f32| -> f32 { (y0 + PANEL - 1) as f32 - ((v - db_min) / (db_max - db_min)).clamp(0.0, 1.0) * plot_h };

    for (series, color) in [(xx, XX_COLOR), (yy, YY_COLOR)] {
        if series.len() < 2 {
            continue;
        }
        let n = series.len();
        for c in 0..n - 1 {
            let x1 = x0 as f32 + c as f32 / (n - 1) as f32 * (PANEL - 1) as f32;
            let x2 = x0 as f32 + (c + 1) as f32 / (n - 1) as f32 * (PANEL - 1) as f32;
            draw_line_segment_mut(img, (x1, scale(series[c])), (x2, scale(series[c + 1])), color);
        }
    }

    draw_text(img, x0 as i32 + 1, y0 as i32, &stand.to_string(), TEXT_COLOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use num_complex::Complex;

    #[test]
    fn renders_the_configured_grid_dimensions() {
        let data = Array4::from_elem((1, 6, 8, 4), Complex::new(1.0f32, 0.0));
        let gulp = Gulp { data };
        let img = render_spectra_grid(&gulp, 3);
        assert_eq!(img.width(), GRID_COLS * PANEL);
        assert_eq!(img.height(), GRID_ROWS * PANEL + HEADER);
    }

    #[test]
    fn db_of_unit_magnitude_is_zero() {
        assert!((db(Complex::new(1.0, 0.0))).abs() < 1e-4);
    }
}
