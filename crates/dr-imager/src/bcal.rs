use crate::ImagerError;
use ndarray::Array3;
use num_complex::Complex64;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// One parsed `*.bcal` calibration table: per-antenna complex gains and
/// flags for both polarizations, plus the table's first channel
/// frequency (used to derive its `caltag`, spec §3).
pub struct CalTableRaw {
    pub first_freq_hz: f64,
    /// `[nstand, nchan, 2]` complex gains (X, Y).
    pub data: Array3<Complex64>,
    /// `[nstand, nchan, 2]` flags (X, Y); `true` = flagged/bad.
    pub flag: Array3<bool>,
}

const MAGIC: &[u8; 4] = b"BCAL";

/// `*.bcal` calibration tables are CASA-style tables (`ANTENNA1`,
/// `CPARAM`, `FLAG`, `SPECTRAL_WINDOW/CHAN_FREQ` columns) produced by the
/// measurement-set ecosystem, itself out of scope (spec §1, "external
/// collaborators... the measurement-set serialization library"). No crate
/// in the pack reads that table format, so this is a small, documented,
/// invented binary layout standing in for it — the same approach as
/// `dr-capture`'s `wire.rs` for the UDP framing. Layout: 4-byte magic
/// `"BCAL"`, `u32` nstand, `u32` nchan, `f64` first-channel frequency
/// (Hz), then `nstand*nchan*2` `(f64 re, f64 im)` gain pairs in
/// `[stand, chan, pol]` row-major order, then `nstand*nchan*2` flag bytes
/// (0 = good, nonzero = flagged) in the same order.
pub fn load_bcal(path: &Path) -> Result<CalTableRaw, ImagerError> {
    let file = File::open(path).map_err(|e| ImagerError::CalTable { path: path.display().to_string(), source: e })?;
    let mut reader = BufReader::new(file);
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| ImagerError::CalTable { path: path.display().to_string(), source: e })?;
    parse_bcal(&bytes).ok_or_else(|| ImagerError::CalFormat {
        path: path.display().to_string(),
        reason: "truncated or malformed bcal payload".into(),
    })
}

fn parse_bcal(bytes: &[u8]) -> Option<CalTableRaw> {
    let mut offset = 0usize;
    let take = |offset: &mut usize, n: usize| -> Option<&[u8]> {
        let slice = bytes.get(*offset..*offset + n)?;
        *offset += n;
        Some(slice)
    };

    if take(&mut offset, 4)? != MAGIC {
        return None;
    }
    let nstand = u32::from_be_bytes(take(&mut offset, 4)?.try_into().ok()?) as usize;
    let nchan = u32::from_be_bytes(take(&mut offset, 4)?.try_into().ok()?) as usize;
    let first_freq_hz = f64::from_be_bytes(take(&mut offset, 8)?.try_into().ok()?);

    let mut data = Array3::<Complex64>::zeros((nstand, nchan, 2));
    for s in 0..nstand {
        for c in 0..nchan {
            for p in 0..2 {
                let re = f64::from_be_bytes(take(&mut offset, 8)?.try_into().ok()?);
                let im = f64::from_be_bytes(take(&mut offset, 8)?.try_into().ok()?);
                data[[s, c, p]] = Complex64::new(re, im);
            }
        }
    }

    let mut flag = Array3::<bool>::from_elem((nstand, nchan, 2), false);
    for s in 0..nstand {
        for c in 0..nchan {
            for p in 0..2 {
                let byte = *take(&mut offset, 1)?.first()?;
                flag[[s, c, p]] = byte != 0;
            }
        }
    }

    Some(CalTableRaw { first_freq_hz, data, flag })
}

/// Serializes a table in the format [`load_bcal`] reads, for tests and
/// for anyone standing up a fixture calibration directory.
pub fn write_bcal(path: &Path, raw: &CalTableRaw) -> std::io::Result<()> {
    use std::io::Write;
    let (nstand, nchan, _) = raw.data.dim();
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(nstand as u32).to_be_bytes());
    out.extend_from_slice(&(nchan as u32).to_be_bytes());
    out.extend_from_slice(&raw.first_freq_hz.to_be_bytes());
    for s in 0..nstand {
        for c in 0..nchan {
            for p in 0..2 {
                let v = raw.data[[s, c, p]];
                out.extend_from_slice(&v.re.to_be_bytes());
                out.extend_from_slice(&v.im.to_be_bytes());
            }
        }
    }
    for s in 0..nstand {
        for c in 0..nchan {
            for p in 0..2 {
                out.push(u8::from(raw.flag[[s, c, p]]));
            }
        }
    }
    File::create(path)?.write_all(&out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_bcal_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bcal");
        let mut data = Array3::<Complex64>::zeros((2, 3, 2));
        data[[0, 0, 0]] = Complex64::new(1.0, 0.5);
        let mut flag = Array3::<bool>::from_elem((2, 3, 2), false);
        flag[[1, 2, 1]] = true;
        let raw = CalTableRaw { first_freq_hz: 50_000_000.123, data, flag };
        write_bcal(&path, &raw).unwrap();

        let back = load_bcal(&path).unwrap();
        assert_eq!(back.first_freq_hz, raw.first_freq_hz);
        assert_eq!(back.data[[0, 0, 0]], Complex64::new(1.0, 0.5));
        assert!(back.flag[[1, 2, 1]]);
        assert!(!back.flag[[0, 0, 0]]);
    }
}
