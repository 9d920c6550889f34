use serde::{Deserialize, Serialize};

/// Correlator sample rate, in Hz.
pub const FS: f64 = 196_000_000.0;

/// Width of a single correlator channel, in Hz.
pub const CHAN_BW: f64 = 23_925.781_25;

/// Sequence header, published once by the producer before the first gulp of
/// a sequence and immutable for the sequence's lifetime.
///
/// Serialized as JSON at the ring boundary (handed from the producer thread
/// to reader threads as an opaque byte blob via [`crate::Ring::begin_sequence`]);
/// every consumer deserializes it back into this fixed struct rather than
/// touching the JSON directly, per the port's "dynamic header becomes a
/// strongly-typed record" rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SequenceHeader {
    /// Sample-count timestamp of the first integration, in ticks of `FS`.
    pub time_tag: i64,
    /// First sequence number observed on the wire.
    pub seq0: i64,
    /// Index of the first channel in the band.
    pub chan0: i64,
    /// Center frequency of the first channel, in Hz (`chan0 * CHAN_BW`).
    pub cfreq: f64,
    /// Number of channels.
    pub nchan: u32,
    /// Total bandwidth, in Hz.
    pub bw: f64,
    /// Number of raw samples averaged into one integration.
    pub navg: i32,
    /// Number of antenna stands.
    pub nstand: u32,
    /// Number of polarization products (always 4: XX, XY, YX, YY).
    pub npol: u32,
    /// Number of baselines, including autocorrelations.
    pub nbl: u32,
    /// Bits per real/imaginary component.
    pub nbit: u32,
    /// Whether samples are complex (always true on this wire format).
    pub complex: bool,
}

impl SequenceHeader {
    /// Builds a header from the quantities derivable at the first packet of
    /// a sequence, per spec §6 "Wire-to-header mapping".
    pub fn from_first_packet(
        time_tag: i64,
        seq0: i64,
        chan0: i64,
        nchan: u32,
        navg: i32,
        nbl: u32,
        fast: bool,
    ) -> Self {
        let nstand = stands_from_baselines(nbl);
        Self {
            time_tag,
            seq0,
            chan0,
            cfreq: chan0 as f64 * CHAN_BW,
            nchan,
            bw: nchan as f64 * CHAN_BW * if fast { 4.0 } else { 1.0 },
            navg,
            nstand,
            npol: 4,
            nbl,
            nbit: 32,
            complex: true,
        }
    }

    /// Number of baselines (including autos) for `nstand` antennas.
    pub const fn baseline_count(nstand: u32) -> u32 {
        nstand * (nstand + 1) / 2
    }

    /// Unix-seconds timestamp of integration `i` within this sequence.
    pub fn unix_time(&self, i: i64) -> f64 {
        (self.time_tag + i * i64::from(self.navg)) as f64 / FS
    }

    /// Tick-domain time tag of integration `i` within this sequence.
    pub fn time_tag_at(&self, i: i64) -> i64 {
        self.time_tag + i * i64::from(self.navg)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Inverts `nbl = nstand*(nstand+1)/2` for the number of stands.
fn stands_from_baselines(nbl: u32) -> u32 {
    (((8 * u64::from(nbl) + 1) as f64).sqrt() as u32 - 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_count_round_trips_stand_count() {
        for nstand in [1u32, 2, 16, 256, 352] {
            let nbl = SequenceHeader::baseline_count(nstand);
            assert_eq!(stands_from_baselines(nbl), nstand);
        }
    }

    #[test]
    fn header_time_tag_advances_by_navg() {
        let hdr = SequenceHeader::from_first_packet(1_000, 0, 100, 128, 24, 64_620, false);
        assert_eq!(hdr.time_tag_at(1) - hdr.time_tag_at(0), i64::from(hdr.navg));
    }

    #[test]
    fn json_round_trip() {
        let hdr = SequenceHeader::from_first_packet(1_000, 0, 100, 128, 24, 64_620, false);
        let bytes = hdr.to_json().unwrap();
        let back = SequenceHeader::from_json(&bytes).unwrap();
        assert_eq!(hdr, back);
    }
}
