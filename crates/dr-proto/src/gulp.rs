use ndarray::Array4;
use num_complex::Complex;

/// A raw, wire-format gulp: `[T, B, C, P]` of 32-bit signed-integer
/// complex samples, exactly as received from the correlator (or
/// synthesized by the offline producer).
#[derive(Debug, Clone)]
pub struct RawGulp {
    pub data: Array4<Complex<i32>>,
}

/// A normalized gulp: `[T, B, C, P]` of 32-bit float complex samples,
/// produced by the writer's first per-gulp step (spec §4.4).
#[derive(Debug, Clone)]
pub struct Gulp {
    pub data: Array4<Complex<f32>>,
}

impl RawGulp {
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }
}

impl Gulp {
    pub fn shape(&self) -> [usize; 4] {
        let s = self.data.shape();
        [s[0], s[1], s[2], s[3]]
    }
}

/// Normalization factor for converting raw integer samples to floats:
/// `(navg / (2*nchan)) * (4 if fast else 1)`, per spec §4.4 step 2.
pub fn norm_factor(navg: i32, nchan: u32, fast: bool) -> f32 {
    let base = f64::from(navg) / (2.0 * f64::from(nchan));
    (base * if fast { 4.0 } else { 1.0 }) as f32
}

/// Converts a raw integer gulp into a normalized complex-float gulp:
/// `cdata = (re + i*im) / norm_factor`.
pub fn normalize(raw: &RawGulp, navg: i32, nchan: u32, fast: bool) -> Gulp {
    let factor = norm_factor(navg, nchan, fast);
    let data = raw.data.mapv(|c| Complex::new(c.re as f32 / factor, c.im as f32 / factor));
    Gulp { data }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn normalize_divides_every_sample_by_the_norm_factor() {
        let data = Array4::from_elem((1, 1, 1, 1), Complex::new(100_i32, -100));
        let raw = RawGulp { data };
        let navg = 24;
        let nchan = 1;
        let gulp = normalize(&raw, navg, nchan, false);
        let factor = norm_factor(navg, nchan, false);
        assert!((gulp.data[[0, 0, 0, 0]].re - 100.0 / factor).abs() < 1e-6);
        assert!((gulp.data[[0, 0, 0, 0]].im - (-100.0 / factor)).abs() < 1e-6);
    }

    #[test]
    fn fast_mode_quadruples_the_norm_factor() {
        let slow = norm_factor(24, 128, false);
        let fast = norm_factor(24, 128, true);
        assert!((fast - 4.0 * slow).abs() < 1e-9);
    }
}
