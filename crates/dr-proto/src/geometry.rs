use num_complex::Complex;

/// Per-antenna East-North-Up position, in meters relative to an array
/// reference point. Station geometry and antenna tables are an external
/// collaborator per spec §1 ("physics helpers... antenna tables"); this
/// crate only needs the ENU vectors, not where they come from.
pub trait AntennaLayout: Send + Sync {
    fn nstand(&self) -> u32;
    /// ENU position of stand `i`, in meters.
    fn position(&self, i: u32) -> [f64; 3];
}

/// A fixed, in-memory antenna layout, the concrete stand-in for the
/// external antenna-table collaborator (spec §1). Good enough to drive
/// the baseline and imager stages' uvw geometry end to end.
#[derive(Debug, Clone)]
pub struct FixedLayout {
    positions: Vec<[f64; 3]>,
}

impl FixedLayout {
    pub fn new(positions: Vec<[f64; 3]>) -> Self {
        Self { positions }
    }
}

impl AntennaLayout for FixedLayout {
    fn nstand(&self) -> u32 {
        self.positions.len() as u32
    }

    fn position(&self, i: u32) -> [f64; 3] {
        self.positions[i as usize]
    }
}

/// Baseline index of the ordered pair `(i, j)` with `i <= j`, in the
/// canonical upper-triangular-including-diagonal order spec.md §3/§4.5
/// assumes throughout (autocorrelations included).
pub const fn baseline_index(i: u32, j: u32, nstand: u32) -> u32 {
    i * (2 * (nstand - 1) + 1 - i) / 2 + (j - i)
}

/// Zenith (u, v, w) in meters for every baseline, given a fixed antenna
/// layout (spec §4.7 "compute zenith (u,v,w) from station geometry").
///
/// Phase-tracking at the local zenith makes the hour-angle zero at every
/// instant: the standard ENU -> (u,v,w) rotation for a zenith phase
/// center reduces to the identity (`u` = East, `v` = North, `w` = Up)
/// regardless of the sample time, so `sample_time` is accepted (per the
/// spec's call signature) but does not change the result for this
/// pointing; it exists so callers that *do* vary pointing later have a
/// stable call shape to extend.
pub fn zenith_uvw_meters(layout: &dyn AntennaLayout, _sample_time: f64) -> Vec<[f64; 3]> {
    let nstand = layout.nstand();
    let mut out = Vec::with_capacity(SequenceHeaderHelper::baseline_count(nstand) as usize);
    for i in 0..nstand {
        let pi = layout.position(i);
        for j in i..nstand {
            let pj = layout.position(j);
            out.push([pj[0] - pi[0], pj[1] - pi[1], pj[2] - pi[2]]);
        }
    }
    out
}

struct SequenceHeaderHelper;
impl SequenceHeaderHelper {
    const fn baseline_count(nstand: u32) -> u32 {
        nstand * (nstand + 1) / 2
    }
}

/// Scales a meter-valued (u,v,w) by `freq/c` to convert to wavelengths,
/// per spec §4.8 "Scale `uvw` by `freq/c` per channel".
pub fn uvw_to_wavelengths(uvw_m: [f64; 3], freq_hz: f64) -> [f64; 3] {
    const C: f64 = 299_792_458.0;
    let scale = freq_hz / C;
    [uvw_m[0] * scale, uvw_m[1] * scale, uvw_m[2] * scale]
}

/// `sqrt(u^2 + v^2)`, the baseline's projected (u,v) distance.
pub fn uv_distance(uvw: [f64; 3]) -> f64 {
    (uvw[0] * uvw[0] + uvw[1] * uvw[1]).sqrt()
}

/// Conjugate-doubles a `[nbl, nchan, 4]` visibility array into
/// `[2*nbl, nchan, 4]` by appending the complex conjugate of every entry,
/// per spec §4.8 "conjugate-double the baseline set".
pub fn conjugate_double(bdata: &ndarray::Array3<Complex<f32>>) -> ndarray::Array3<Complex<f32>> {
    let (nbl, nchan, npol) = bdata.dim();
    let mut out = ndarray::Array3::<Complex<f32>>::zeros((2 * nbl, nchan, npol));
    out.slice_mut(ndarray::s![..nbl, .., ..]).assign(bdata);
    let conj = bdata.mapv(|c| c.conj());
    out.slice_mut(ndarray::s![nbl.., .., ..]).assign(&conj);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_count_matches_autocorrelation_included_layout() {
        let layout = FixedLayout::new(vec![[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0]]);
        let uvw = zenith_uvw_meters(&layout, 0.0);
        assert_eq!(uvw.len(), 6); // nstand=3 -> nbl=6
        assert_eq!(uvw[0], [0.0, 0.0, 0.0]); // autocorrelation 0-0
    }

    #[test]
    fn east_west_baseline_has_zero_v_and_w() {
        let layout = FixedLayout::new(vec![[0.0, 0.0, 0.0], [50.0, 0.0, 0.0]]);
        let uvw = zenith_uvw_meters(&layout, 12345.0);
        // baseline (0,1): index 1 in [ (0,0), (0,1), (1,1) ]
        assert_eq!(uvw[1], [50.0, 0.0, 0.0]);
    }

    #[test]
    fn conjugate_double_mirrors_the_imaginary_part() {
        let mut b = ndarray::Array3::<Complex<f32>>::zeros((1, 1, 1));
        b[[0, 0, 0]] = Complex::new(1.0, 2.0);
        let doubled = conjugate_double(&b);
        assert_eq!(doubled.dim(), (2, 1, 1));
        assert_eq!(doubled[[0, 0, 0]], Complex::new(1.0, 2.0));
        assert_eq!(doubled[[1, 0, 0]], Complex::new(1.0, -2.0));
    }
}
