use ndarray::Array2;
use num_complex::Complex32;
use rustfft::{num_complex::Complex as RustComplex, FftPlanner};

/// In-place-equivalent 2D inverse FFT (rows, then columns), normalized by
/// `1/n^2` so a DC-only grid inverts to a constant image (spec §4.8
/// "invert the gridded visibility plane with a 2D FFT").
pub fn ifft2(grid: &Array2<Complex32>) -> Array2<Complex32> {
    let n = grid.nrows();
    assert_eq!(n, grid.ncols(), "imager grid must be square");

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_inverse(n);

    let mut data: Vec<RustComplex<f32>> = grid.iter().map(|c| RustComplex::new(c.re, c.im)).collect();

    for row in 0..n {
        let start = row * n;
        fft.process(&mut data[start..start + n]);
    }

    let mut column = vec![RustComplex::new(0.0, 0.0); n];
    for col in 0..n {
        for (row, slot) in column.iter_mut().enumerate() {
            *slot = data[row * n + col];
        }
        fft.process(&mut column);
        for (row, value) in column.iter().enumerate() {
            data[row * n + col] = *value;
        }
    }

    let norm = 1.0 / (n * n) as f32;
    let out: Vec<Complex32> = data.iter().map(|c| Complex32::new(c.re * norm, c.im * norm)).collect();
    Array2::from_shape_vec((n, n), out).expect("row-major buffer matches grid shape")
}

/// Swaps quadrants so the zero-frequency (phase center) component moves
/// from the corners to the middle of the image (spec §4.8, and the
/// peak-at-center testable property in §8).
pub fn fftshift(img: &Array2<f32>) -> Array2<f32> {
    let n = img.nrows();
    let half = n / 2;
    Array2::from_shape_fn((n, n), |(r, c)| img[[(r + half) % n, (c + half) % n]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_dc_only_grid_inverts_to_a_constant_image() {
        let mut grid = Array2::<Complex32>::zeros((8, 8));
        grid[[0, 0]] = Complex32::new(64.0, 0.0);
        let image = ifft2(&grid);
        for value in image.iter() {
            assert!((value.re - 1.0).abs() < 1e-4, "{}", value.re);
            assert!(value.im.abs() < 1e-4);
        }
    }

    #[test]
    fn fftshift_moves_the_dc_corner_to_the_center() {
        let mut img = Array2::<f32>::zeros((8, 8));
        img[[0, 0]] = 1.0;
        let shifted = fftshift(&img);
        assert_eq!(shifted[[4, 4]], 1.0);
        assert_eq!(shifted[[0, 0]], 0.0);
    }
}
