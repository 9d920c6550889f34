use dr_proto::label::{draw_text, text_width};
use crate::seq::SeqState;
use crate::Gate;
use dr_proto::{normalize, uv_distance, zenith_uvw_meters, AntennaLayout, Gulp, MonitorPoint, MonitorSink, Pol, RawGulp, ShutdownEvent, FS};
use dr_ring::ReadStream;
use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const CADENCE: Duration = Duration::from_secs(60);
/// Baselines shorter than this (meters) are excluded from the plot, per
/// spec §4.7 "select baselines with |uv| > 0.1 m".
const MIN_UV_DISTANCE_M: f64 = 0.1;
const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const MARGIN: i32 = 30;

const XX_COLOR: Rgb<u8> = Rgb([217, 95, 2]);
const YY_COLOR: Rgb<u8> = Rgb([27, 158, 119]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS_COLOR: Rgb<u8> = Rgb([120, 120, 120]);
const TEXT_COLOR: Rgb<u8> = Rgb([40, 40, 40]);

/// Per-minute amplitude-vs-uv-distance plot at band center (spec §4.7).
pub struct BaselineStage {
    input: ReadStream<RawGulp>,
    monitor: Arc<dyn MonitorSink>,
    layout: Arc<dyn AntennaLayout>,
}

impl BaselineStage {
    pub fn new(input: ReadStream<RawGulp>, monitor: Arc<dyn MonitorSink>, layout: Arc<dyn AntennaLayout>) -> Self {
        Self { input, monitor, layout }
    }

    pub fn run(mut self, shutdown: &ShutdownEvent) -> Result<(), crate::MonitorError> {
        let mut seq = SeqState::default();
        let mut gate = Gate::new(CADENCE);

        while !shutdown.is_set() {
            let Some(span) = self.input.next_span() else { break };
            let header = seq.observe(&span)?;

            if gate.ready() {
                let gulp = normalize(&span.payload, header.navg, header.nchan, false);
                let sample_time = seq.time_tag as f64 / FS;
                let uvw = zenith_uvw_meters(self.layout.as_ref(), sample_time);
                let img = render_baseline_plot(&gulp, &uvw);
                self.monitor.publish("diagnostics/baselines", MonitorPoint::Image(Arc::new(img)));
            }

            seq.advance(header.navg);
        }
        Ok(())
    }
}

fn render_baseline_plot(gulp: &Gulp, uvw: &[[f64; 3]]) -> RgbImage {
    use imageproc::drawing::draw_line_segment_mut;

    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, WHITE);
    let (_, nbl, nchan, _) = gulp.data.dim();
    let center_chan = nchan / 2;

    let mut points_xx = Vec::new();
    let mut points_yy = Vec::new();
    let mut max_dist = MIN_UV_DISTANCE_M;
    let mut max_amp = 0.0f64;

    for bl in 0..nbl.min(uvw.len()) {
        let dist = uv_distance(uvw[bl]);
        if dist <= MIN_UV_DISTANCE_M {
            continue;
        }
        let xx_amp = f64::from(gulp.data[[0, bl, center_chan, Pol::Xx.index()]].norm());
        let yy_amp = f64::from(gulp.data[[0, bl, center_chan, Pol::Yy.index()]].norm());
        max_dist = max_dist.max(dist);
        max_amp = max_amp.max(xx_amp).max(yy_amp);
        points_xx.push((dist, xx_amp));
        points_yy.push((dist, yy_amp));
    }
    if max_amp <= 0.0 {
        max_amp = 1.0;
    }

    let plot_w = (WIDTH as i32 - 2 * MARGIN) as f64;
    let plot_h = (HEIGHT as i32 - 2 * MARGIN) as f64;
    let to_px = |dist: f64, amp: f64| -> (f32, f32) {
        let x = MARGIN as f64 + (dist / max_dist).clamp(0.0, 1.0) * plot_w;
        let y = (HEIGHT as i32 - MARGIN) as f64 - (amp / max_amp).clamp(0.0, 1.0) * plot_h;
        (x as f32, y as f32)
    };

    // axes
    draw_line_segment_mut(
        &mut img,
        (MARGIN as f32, (HEIGHT as i32 - MARGIN) as f32),
        ((WIDTH as i32 - MARGIN) as f32, (HEIGHT as i32 - MARGIN) as f32),
        AXIS_COLOR,
    );
    draw_line_segment_mut(
        &mut img,
        (MARGIN as f32, MARGIN as f32),
        (MARGIN as f32, (HEIGHT as i32 - MARGIN) as f32),
        AXIS_COLOR,
    );

    for ((dist, amp), color) in points_xx.iter().map(|p| (p, XX_COLOR)).chain(points_yy.iter().map(|p| (p, YY_COLOR))) {
        let (x, y) = to_px(*dist, *amp);
        draw_cross(&mut img, x, y, color);
    }

    draw_text(&mut img, MARGIN, 4, "|V| VS UV DISTANCE", TEXT_COLOR);
    let legend = "XX YY";
    draw_text(&mut img, WIDTH as i32 - MARGIN - text_width(legend) as i32, 4, legend, XX_COLOR);
    let unix_now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    draw_text(&mut img, MARGIN, HEIGHT as i32 - 14, &format!("UTC {unix_now}"), TEXT_COLOR);

    img
}

fn draw_cross(img: &mut RgbImage, x: f32, y: f32, color: Rgb<u8>) {
    for (dx, dy) in [(-1, -1), (0, 0), (1, 1), (-1, 1), (1, -1)] {
        let px = x as i32 + dx;
        let py = y as i32 + dy;
        if px >= 0 && py >= 0 && (px as u32) < img.width() && (py as u32) < img.height() {
            img.put_pixel(px as u32, py as u32, color);
        }
    }
}
