use ndarray::ArrayView3;
use num_complex::Complex32;

/// Polarization product order within the trailing axis of a calibrated
/// baseline/channel/pol cube: `[XX, XY, YX, YY]` (spec §4.1 "Gulp data
/// model").
pub const XX: usize = 0;
pub const XY: usize = 1;
pub const YX: usize = 2;
pub const YY: usize = 3;

/// `I = XX + YY` for every baseline and channel (spec §4.8 "Stokes
/// parameters").
pub fn stokes_i(bdata: &ArrayView3<Complex32>) -> Vec<Complex32> {
    let (nbl, nchan, _) = bdata.dim();
    let mut out = Vec::with_capacity(nbl * nchan);
    for k in 0..nbl {
        for c in 0..nchan {
            out.push(bdata[[k, c, XX]] + bdata[[k, c, YY]]);
        }
    }
    out
}

/// `V = XY - YX`, with the conjugate-mirrored half of the baseline axis
/// (spec's conjugate-doubling convention) rotated by swapping real and
/// imaginary parts and negating the new real part — this is the same
/// `±i` rotation that turns `V`'s sign convention consistent across the
/// the baseline `(i,j)` / `(j,i)` mirror (spec §4.8 "Stokes V on the
/// mirrored half gets an additional i-rotation").
pub fn stokes_v(bdata: &ArrayView3<Complex32>, nbl: usize) -> Vec<Complex32> {
    let (total_bl, nchan, _) = bdata.dim();
    let mut out = Vec::with_capacity(total_bl * nchan);
    for k in 0..total_bl {
        for c in 0..nchan {
            let v = bdata[[k, c, XY]] - bdata[[k, c, YX]];
            let v = if k >= nbl { Complex32::new(-v.im, v.re) } else { v };
            out.push(v);
        }
    }
    out
}
