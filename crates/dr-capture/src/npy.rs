use crate::CaptureError;
use ndarray::Array3;
use num_complex::Complex;
use std::path::Path;

const MAGIC: &[u8] = b"\x93NUMPY";

/// Minimal reader for the subset of the `.npy` format the sky-model file
/// uses: a 2-D complex array of shape `(nbl, nchan, 4)`, stored as either
/// `<c8` (complex64) or `<c16` (complex128), C-contiguous.
///
/// This is hand-rolled rather than pulled from a crate because no pack
/// dependency covers it; the format itself is simple enough (a fixed
/// magic, a Python-literal header, then raw row-major bytes) that a
/// small parser is more honest than a speculative dependency.
pub fn load_sky_model(path: &Path, expected_shape: (usize, usize, usize)) -> Result<Array3<Complex<f32>>, CaptureError> {
    let bytes = std::fs::read(path).map_err(CaptureError::Io)?;
    if bytes.len() < 10 || &bytes[0..6] != MAGIC {
        return Err(CaptureError::SkyModel("missing .npy magic".into()));
    }
    let major = bytes[6];
    let (header_len, header_start) = if major == 1 {
        let len = u16::from_le_bytes(bytes[8..10].try_into().unwrap()) as usize;
        (len, 10)
    } else {
        let len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        (len, 12)
    };
    let header = std::str::from_utf8(&bytes[header_start..header_start + header_len])
        .map_err(|_| CaptureError::SkyModel("header is not utf-8".into()))?;

    let complex16 = header.contains("'<c16'");
    let complex8 = header.contains("'<c8'");
    if !complex16 && !complex8 {
        return Err(CaptureError::SkyModel(format!("unsupported dtype in header: {header}")));
    }
    let elem_bytes = if complex16 { 16 } else { 8 };

    let data_start = header_start + header_len;
    let (nbl, nchan, npol) = expected_shape;
    let expected_elems = nbl * nchan * npol;
    let data = &bytes[data_start..];
    if data.len() < expected_elems * elem_bytes {
        return Err(CaptureError::SkyModel(format!(
            "sky model file has {} bytes, need {} for shape {:?}",
            data.len(),
            expected_elems * elem_bytes,
            expected_shape
        )));
    }

    let mut out = Array3::<Complex<f32>>::zeros((nbl, nchan, npol));
    let half = elem_bytes / 2;
    for (i, slot) in out.iter_mut().enumerate() {
        let off = i * elem_bytes;
        let (re, im) = if complex16 {
            (
                f64::from_le_bytes(data[off..off + 8].try_into().unwrap()) as f32,
                f64::from_le_bytes(data[off + 8..off + 16].try_into().unwrap()) as f32,
            )
        } else {
            (
                f32::from_le_bytes(data[off..off + 4].try_into().unwrap()),
                f32::from_le_bytes(data[off + half..off + half + 4].try_into().unwrap()),
            )
        };
        *slot = Complex::new(re, im);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_complex64_npy(path: &Path, shape: (usize, usize, usize), fill: Complex<f32>) {
        let mut header = format!(
            "{{'descr': '<c8', 'fortran_order': False, 'shape': ({}, {}, {}), }}",
            shape.0, shape.1, shape.2
        );
        // pad to 16-byte alignment including the trailing newline, as real .npy files do
        while (10 + header.len() + 1) % 16 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.push(1);
        buf.push(0);
        buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        buf.extend_from_slice(header.as_bytes());
        for _ in 0..(shape.0 * shape.1 * shape.2) {
            buf.extend_from_slice(&fill.re.to_le_bytes());
            buf.extend_from_slice(&fill.im.to_le_bytes());
        }
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&buf).unwrap();
    }

    #[test]
    fn reads_back_a_uniform_complex64_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sky.npy");
        write_complex64_npy(&path, (2, 3, 4), Complex::new(1.5, -2.5));

        let arr = load_sky_model(&path, (2, 3, 4)).unwrap();
        assert_eq!(arr.dim(), (2, 3, 4));
        assert_eq!(arr[[0, 0, 0]], Complex::new(1.5, -2.5));
        assert_eq!(arr[[1, 2, 3]], Complex::new(1.5, -2.5));
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.npy");
        std::fs::write(&path, b"not an npy file").unwrap();
        assert!(load_sky_model(&path, (1, 1, 4)).is_err());
    }
}
