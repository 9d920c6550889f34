/// Maximum size of a single "cor"-framed datagram, per spec §6.
pub const COR_MTU: usize = 9000;

/// Fixed-size packet header preceding the payload: `seq0` and `time_tag`
/// as big-endian `i64`, then `chan0` as big-endian `i64`, then `nchan`,
/// `navg`, `nsrc` as big-endian `u32`. The exact on-wire layout of the
/// correlator's framing is an external collaborator (spec §1 "Out of
/// scope"); this is the minimal fixed layout the port needs to exercise
/// the fields spec §6 names.
pub const HEADER_BYTES: usize = 8 + 8 + 8 + 4 + 4 + 4;

#[derive(Debug, Clone, Copy)]
pub struct CorHeader {
    pub seq0: i64,
    pub time_tag: i64,
    pub chan0: i64,
    pub nchan: u32,
    pub navg: i32,
    pub nsrc: u32,
}

impl CorHeader {
    /// Parses a header from the front of a datagram. `None` if the
    /// datagram is too short to contain one.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_BYTES {
            return None;
        }
        let seq0 = i64::from_be_bytes(buf[0..8].try_into().unwrap());
        let time_tag = i64::from_be_bytes(buf[8..16].try_into().unwrap());
        let chan0 = i64::from_be_bytes(buf[16..24].try_into().unwrap());
        let nchan = u32::from_be_bytes(buf[24..28].try_into().unwrap());
        let navg = i32::from_be_bytes(buf[28..32].try_into().unwrap());
        let nsrc = u32::from_be_bytes(buf[32..36].try_into().unwrap());
        Some(Self { seq0, time_tag, chan0, nchan, navg, nsrc })
    }

    /// Number of complex samples carried in one integration's payload:
    /// one per (baseline, channel, pol) triple. This port treats a single
    /// packet as carrying one full integration, rather than reassembling
    /// a integration out of several per-channel-range packets.
    pub fn samples_per_packet(&self) -> usize {
        self.nsrc as usize * self.nchan as usize * 4
    }

    /// Expected payload size in bytes: 4-byte real + 4-byte imaginary
    /// `i32` per sample.
    pub fn payload_bytes(&self) -> usize {
        self.samples_per_packet() * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_manual_encoding() {
        let mut buf = vec![0u8; HEADER_BYTES];
        buf[0..8].copy_from_slice(&42i64.to_be_bytes());
        buf[8..16].copy_from_slice(&1_000_000i64.to_be_bytes());
        buf[16..24].copy_from_slice(&100i64.to_be_bytes());
        buf[24..28].copy_from_slice(&128u32.to_be_bytes());
        buf[28..32].copy_from_slice(&24i32.to_be_bytes());
        buf[32..36].copy_from_slice(&64620u32.to_be_bytes());

        let hdr = CorHeader::parse(&buf).unwrap();
        assert_eq!(hdr.seq0, 42);
        assert_eq!(hdr.time_tag, 1_000_000);
        assert_eq!(hdr.chan0, 100);
        assert_eq!(hdr.nchan, 128);
        assert_eq!(hdr.navg, 24);
        assert_eq!(hdr.nsrc, 64_620);
    }

    #[test]
    fn short_buffer_fails_to_parse() {
        assert!(CorHeader::parse(&[0u8; 4]).is_none());
    }
}
