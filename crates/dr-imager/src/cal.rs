use crate::bcal::{load_bcal, CalTableRaw};
use crate::ImagerError;
use ndarray::Array3;
use num_complex::Complex32;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

/// One materialized calibration table entry, keyed by `caltag` (spec §3
/// "Calibration cache").
struct CalEntry {
    nstand: u32,
    nchan: u32,
    raw: CalTableRaw,
}

/// Per-antenna complex-gain calibration cache, keyed by
/// `caltag = round(first_channel_frequency_Hz)`, with the per-baseline
/// product matrix built lazily on first use for a given caltag (spec §3,
/// §4.8 "Calibration").
///
/// Owned by the imager thread alone (spec §5): no internal locking, a
/// directory mtime poll is the only external signal it reacts to.
pub struct CalCache {
    dir: Option<PathBuf>,
    last_mtime: Option<SystemTime>,
    entries: HashMap<i64, CalEntry>,
    /// `[2*nbl, nchan, 4]` per-caltag product matrix, built once per
    /// caltag and reused across every subsequent `apply` call until the
    /// cache is invalidated.
    products: HashMap<i64, Array3<Complex32>>,
}

impl CalCache {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir, last_mtime: None, entries: HashMap::new(), products: HashMap::new() }
    }

    pub fn is_configured(&self) -> bool {
        self.dir.is_some()
    }

    /// Polls the calibration directory's mtime; if it has increased since
    /// the last check, discards every cached entry and product and
    /// rescans `*.bcal` tables, keying each by `round(first_freq_hz)`
    /// (spec §3 "a directory-mtime bump invalidates and repopulates the
    /// cache atomically"). Returns `true` if a reload happened.
    pub fn maybe_reload(&mut self) -> Result<bool, ImagerError> {
        let Some(dir) = self.dir.clone() else { return Ok(false) };
        let mtime = std::fs::metadata(&dir).and_then(|m| m.modified()).map_err(ImagerError::CalDir)?;
        if self.last_mtime == Some(mtime) {
            return Ok(false);
        }

        tracing::info!(dir = %dir.display(), "reloading calibration tables");
        let mut entries = HashMap::new();
        for entry in std::fs::read_dir(&dir).map_err(ImagerError::CalDir)? {
            let entry = entry.map_err(ImagerError::CalDir)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bcal") {
                continue;
            }
            let raw = load_bcal(&path)?;
            let caltag = raw.first_freq_hz.round() as i64;
            let (nstand, nchan, _) = raw.data.dim();
            entries.insert(caltag, CalEntry { nstand: nstand as u32, nchan: nchan as u32, raw });
        }

        self.entries = entries;
        self.products.clear();
        self.last_mtime = Some(mtime);
        Ok(true)
    }

    /// Returns the `[2*nbl, nchan, 4]` calibration product for `caltag`,
    /// building it on first use (spec's "lazy buffer allocation" design
    /// note becomes an explicit memoized build here, not a re-check on
    /// every call). `None` if no table in the cache matches this caltag
    /// (imager proceeds uncalibrated, spec §7).
    pub fn product_for(&mut self, caltag: i64, nbl: u32) -> Option<&Array3<Complex32>> {
        if self.products.contains_key(&caltag) {
            return self.products.get(&caltag);
        }
        let entry = self.entries.get(&caltag)?;
        let product = build_product(entry, nbl);
        self.products.insert(caltag, product);
        self.products.get(&caltag)
    }
}

/// Builds `cal[k] = (1-flag_i)/g_i * conj((1-flag_j)/g_j)` for every
/// baseline and polarization product, mirroring the conjugate tail for
/// the second `nbl` rows (spec §4.8).
fn build_product(entry: &CalEntry, nbl: u32) -> Array3<Complex32> {
    let nchan = entry.nchan;
    let mut out = Array3::<Complex32>::from_elem((2 * nbl as usize, nchan as usize, 4), Complex32::new(1.0, 0.0));

    let mut k = 0usize;
    for i in 0..entry.nstand {
        for j in i..entry.nstand {
            for c in 0..nchan {
                let gx_i = gain_term(entry, i, c, 0);
                let gy_i = gain_term(entry, i, c, 1);
                let gx_j = gain_term(entry, j, c, 0);
                let gy_j = gain_term(entry, j, c, 1);

                let xx = clean(gx_i * gx_j.conj());
                let xy = clean(gx_i * gy_j.conj());
                let yx = clean(gy_i * gx_j.conj());
                let yy = clean(gy_i * gy_j.conj());

                out[[k, c as usize, 0]] = xx;
                out[[k, c as usize, 1]] = xy;
                out[[k, c as usize, 2]] = yx;
                out[[k, c as usize, 3]] = yy;

                out[[k + nbl as usize, c as usize, 0]] = xx.conj();
                out[[k + nbl as usize, c as usize, 1]] = xy.conj();
                out[[k + nbl as usize, c as usize, 2]] = yx.conj();
                out[[k + nbl as usize, c as usize, 3]] = yy.conj();
            }
            k += 1;
        }
    }
    out
}

/// `(1-flag)/g` for one antenna/channel/pol, per spec §4.8
/// "`cal[k] = (1-flag_i)/g_i * conj((1-flag_j)/g_j)`".
fn gain_term(entry: &CalEntry, stand: u32, chan: u32, pol: usize) -> Complex32 {
    let gain = entry.raw.data[[stand as usize, chan as usize, pol]];
    let flagged = entry.raw.flag[[stand as usize, chan as usize, pol]];
    let weight = if flagged { 0.0 } else { 1.0 };
    let gain32 = Complex32::new(gain.re as f32, gain.im as f32);
    clean(Complex32::new(weight, 0.0) / gain32)
}

/// Replaces non-finite values (from a zero gain dividing to infinity or
/// NaN) with zero, per spec §4.8.
fn clean(c: Complex32) -> Complex32 {
    if c.re.is_finite() && c.im.is_finite() {
        c
    } else {
        Complex32::new(0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bcal::write_bcal;
    use ndarray::Array3 as NdArray3;
    use num_complex::Complex64;

    fn fixture_table(first_freq_hz: f64, nstand: usize, nchan: usize) -> CalTableRaw {
        let mut data = NdArray3::<Complex64>::from_elem((nstand, nchan, 2), Complex64::new(1.0, 0.0));
        data[[0, 0, 0]] = Complex64::new(2.0, 0.0);
        let flag = NdArray3::<bool>::from_elem((nstand, nchan, 2), false);
        CalTableRaw { first_freq_hz, data, flag }
    }

    #[test]
    fn caltag_is_an_exact_round_of_the_first_frequency() {
        let dir = tempfile::tempdir().unwrap();
        write_bcal(&dir.path().join("t.bcal"), &fixture_table(49_999_999.6, 2, 2)).unwrap();
        let mut cache = CalCache::new(Some(dir.path().to_path_buf()));
        cache.maybe_reload().unwrap();
        assert!(cache.entries.contains_key(&50_000_000));
        assert!(!cache.entries.contains_key(&49_999_999));
    }

    #[test]
    fn mtime_bump_discards_stale_entries_before_new_lookup() {
        let dir = tempfile::tempdir().unwrap();
        write_bcal(&dir.path().join("t.bcal"), &fixture_table(1_000_000.0, 2, 2)).unwrap();
        let mut cache = CalCache::new(Some(dir.path().to_path_buf()));
        cache.maybe_reload().unwrap();
        assert!(cache.entries.contains_key(&1_000_000));

        std::fs::remove_file(dir.path().join("t.bcal")).unwrap();
        write_bcal(&dir.path().join("u.bcal"), &fixture_table(2_000_000.0, 2, 2)).unwrap();
        // force a detectable mtime change on most filesystems
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::File::create(dir.path().join(".touch")).unwrap();
        std::fs::remove_file(dir.path().join(".touch")).unwrap();

        cache.maybe_reload().unwrap();
        assert!(!cache.entries.contains_key(&1_000_000));
        assert!(cache.entries.contains_key(&2_000_000));
    }

    #[test]
    fn no_matching_caltag_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        write_bcal(&dir.path().join("t.bcal"), &fixture_table(1_000_000.0, 2, 2)).unwrap();
        let mut cache = CalCache::new(Some(dir.path().to_path_buf()));
        cache.maybe_reload().unwrap();
        assert!(cache.product_for(999, 3).is_none());
    }
}
