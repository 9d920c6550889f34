use dr_proto::label::draw_text;
use image::{Rgb, RgbImage};

/// Composite canvas size (spec §4.8 "an 860x420 composite image").
pub const COMPOSITE_WIDTH: u32 = 860;
pub const COMPOSITE_HEIGHT: u32 = 420;
const PANEL_MARGIN: u32 = 10;
const HEADER_HEIGHT: u32 = 20;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Assembles the final diagnostic frame: Stokes I on the left, `|V|` on
/// the right, with a UTC timestamp, center frequency, and
/// calibrated/uncalibrated tag banner across the top (spec §4.8
/// "composite... annotated with UTC time, center frequency, and whether
/// calibration was applied").
pub fn compose(stokes_i: &RgbImage, stokes_v_abs: &RgbImage, utc: &str, center_freq_mhz: f64, calibrated: bool) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(COMPOSITE_WIDTH, COMPOSITE_HEIGHT, Rgb([0, 0, 0]));

    let panel_h = COMPOSITE_HEIGHT - HEADER_HEIGHT - PANEL_MARGIN;
    let panel_w = (COMPOSITE_WIDTH - 3 * PANEL_MARGIN) / 2;

    blit_scaled(&mut canvas, stokes_i, PANEL_MARGIN, HEADER_HEIGHT, panel_w, panel_h);
    blit_scaled(&mut canvas, stokes_v_abs, 2 * PANEL_MARGIN + panel_w, HEADER_HEIGHT, panel_w, panel_h);

    let cal_tag = if calibrated { "CAL" } else { "UNCAL" };
    let header = format!("{} {:.3}MHZ {}", utc, center_freq_mhz, cal_tag);
    draw_text(&mut canvas, PANEL_MARGIN as i32, 4, &header, WHITE);
    draw_text(&mut canvas, PANEL_MARGIN as i32, HEADER_HEIGHT as i32 + 2, "STOKES I", WHITE);
    draw_text(
        &mut canvas,
        (2 * PANEL_MARGIN + panel_w) as i32,
        HEADER_HEIGHT as i32 + 2,
        "STOKES V",
        WHITE,
    );

    canvas
}

/// Nearest-neighbor blit of `src` into `dst` at `(x, y)`, scaled to
/// exactly `(w, h)`. Diagnostic panels don't need a filtered resize.
fn blit_scaled(dst: &mut RgbImage, src: &RgbImage, x: u32, y: u32, w: u32, h: u32) {
    let (sw, sh) = src.dimensions();
    if sw == 0 || sh == 0 {
        return;
    }
    for dy in 0..h {
        for dx in 0..w {
            let sx = dx * sw / w;
            let sy = dy * sh / h;
            dst.put_pixel(x + dx, y + dy, *src.get_pixel(sx, sy));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_has_the_spec_mandated_dimensions() {
        let left = RgbImage::from_pixel(200, 200, Rgb([10, 10, 10]));
        let right = RgbImage::from_pixel(200, 200, Rgb([20, 20, 20]));
        let out = compose(&left, &right, "2026-07-27T00:00:00Z", 74.03, true);
        assert_eq!(out.dimensions(), (COMPOSITE_WIDTH, COMPOSITE_HEIGHT));
    }

    #[test]
    fn both_panels_are_present_and_distinct() {
        let left = RgbImage::from_pixel(4, 4, Rgb([200, 0, 0]));
        let right = RgbImage::from_pixel(4, 4, Rgb([0, 200, 0]));
        let out = compose(&left, &right, "t", 1.0, false);
        assert_eq!(*out.get_pixel(PANEL_MARGIN + 5, HEADER_HEIGHT + 5), Rgb([200, 0, 0]));
        let right_x = 2 * PANEL_MARGIN + (COMPOSITE_WIDTH - 3 * PANEL_MARGIN) / 2 + 5;
        assert_eq!(*out.get_pixel(right_x, HEADER_HEIGHT + 5), Rgb([0, 200, 0]));
    }
}
