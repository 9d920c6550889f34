use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::f32::consts::PI;

/// Percentile clip window applied before colormapping (spec §4.8
/// "clip to the 5th-99.95th percentile").
const LOW_PERCENTILE: f32 = 0.05;
const HIGH_PERCENTILE: f32 = 0.9995;

/// D.A. Green's cubehelix scheme (2011): a perceptually-monotone scalar
/// colormap built from a spiral through RGB space rather than a lookup
/// table, which is the "fixed cubic colormap" the spec calls for.
fn cubehelix(t: f32) -> Rgb<u8> {
    const START: f32 = 0.5;
    const ROTATIONS: f32 = -1.5;
    const HUE: f32 = 1.0;
    const GAMMA: f32 = 1.0;

    let t = t.clamp(0.0, 1.0);
    let fract = t.powf(GAMMA);
    let angle = 2.0 * PI * (START / 3.0 + ROTATIONS * t);
    let amp = HUE * fract * (1.0 - fract) / 2.0;
    let (sin_a, cos_a) = angle.sin_cos();

    let r = fract + amp * (-0.14861 * cos_a + 1.78277 * sin_a);
    let g = fract + amp * (-0.29227 * cos_a - 0.90649 * sin_a);
    let b = fract + amp * (1.97294 * cos_a);

    let to_byte = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([to_byte(r), to_byte(g), to_byte(b)])
}

/// Maps a scalar-valued image to an `RgbImage` via [`cubehelix`], clipped
/// to the `[LOW_PERCENTILE, HIGH_PERCENTILE]` range of the data itself
/// (spec §4.8), then circularly masked to the horizon and corner-flooded
/// to black (spec §4.8 "mask outside the horizon circle; flood-fill the
/// four corners black").
pub fn colorize(data: &ndarray::Array2<f32>) -> RgbImage {
    let (h, w) = data.dim();
    let mut sorted: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let (lo, hi) = if sorted.is_empty() {
        (0.0, 1.0)
    } else {
        let lo_idx = ((sorted.len() - 1) as f32 * LOW_PERCENTILE) as usize;
        let hi_idx = ((sorted.len() - 1) as f32 * HIGH_PERCENTILE) as usize;
        let lo = sorted[lo_idx];
        let hi = sorted[hi_idx].max(lo + f32::EPSILON);
        (lo, hi)
    };

    let mut img = RgbImage::new(w as u32, h as u32);
    for (y, row) in data.rows().into_iter().enumerate() {
        for (x, value) in row.iter().enumerate() {
            let t = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
            img.put_pixel(x as u32, y as u32, cubehelix(t));
        }
    }

    mask_outside_horizon(&mut img);
    flood_fill_corners_black(&mut img);
    img
}

fn mask_outside_horizon(img: &mut RgbImage) {
    let (w, h) = img.dimensions();
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let radius = w.min(h) as f32 / 2.0;
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            if (dx * dx + dy * dy).sqrt() > radius {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }
}

fn flood_fill_corners_black(img: &mut RgbImage) {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    for &(x, y) in &[(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)] {
        flood_fill_black(img, x, y);
    }
}

fn flood_fill_black(img: &mut RgbImage, x0: u32, y0: u32) {
    let (w, h) = img.dimensions();
    let target = *img.get_pixel(x0, y0);
    if target == Rgb([0, 0, 0]) {
        return;
    }

    let mut visited = vec![false; (w * h) as usize];
    let mut queue = VecDeque::new();
    queue.push_back((x0, y0));

    while let Some((x, y)) = queue.pop_front() {
        let idx = (y * w + x) as usize;
        if visited[idx] || *img.get_pixel(x, y) != target {
            continue;
        }
        visited[idx] = true;
        img.put_pixel(x, y, Rgb([0, 0, 0]));

        if x > 0 {
            queue.push_back((x - 1, y));
        }
        if x + 1 < w {
            queue.push_back((x + 1, y));
        }
        if y > 0 {
            queue.push_back((x, y - 1));
        }
        if y + 1 < h {
            queue.push_back((x, y + 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn cubehelix_stays_in_gamut_across_the_full_range() {
        for i in 0..=10 {
            let t = i as f32 / 10.0;
            let Rgb([_, _, _]) = cubehelix(t);
        }
    }

    #[test]
    fn colorize_blacks_out_the_four_corners() {
        let data = Array2::<f32>::from_elem((20, 20), 1.0);
        let img = colorize(&data);
        assert_eq!(*img.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*img.get_pixel(19, 19), Rgb([0, 0, 0]));
    }

    #[test]
    fn colorize_leaves_the_center_unmasked() {
        let data = Array2::<f32>::from_shape_fn((20, 20), |(r, c)| (r + c) as f32);
        let img = colorize(&data);
        assert_ne!(*img.get_pixel(10, 10), Rgb([0, 0, 0]));
    }
}
