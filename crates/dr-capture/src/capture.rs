use crate::wire::{CorHeader, COR_MTU};
use crate::{CaptureError, GulpProducer};
use dr_proto::{ShutdownEvent, SequenceHeader};
use dr_ring::{Ring, RingConfig};
use dr_ring::FillLevelQueue;
use ndarray::Array4;
use num_complex::Complex;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receive timeout for the capture socket, per spec §6.
const RECV_TIMEOUT: Duration = Duration::from_secs(11);

struct RawPacket {
    header: CorHeader,
    payload: Vec<u8>,
}

/// Live the producer takes from the wire: a full packet, a detected gap
/// (the expected integration never arrived), or a retune boundary (the
/// next packet belongs to a different sequence).
enum Slot {
    Present(RawPacket),
    Missing,
    Retune(RawPacket),
    Shutdown,
}

/// Ingests "cor"-framed UDP correlator packets, reassembles them into
/// gulps of `ntime_gulp` integrations, and publishes them to a ring along
/// with a per-gulp fill-level sample (spec §4.2).
pub struct CaptureProducer {
    socket: UdpSocket,
    ring: Arc<Ring<dr_proto::RawGulp>>,
    fill: Arc<FillLevelQueue>,
    ntime_gulp: usize,
    fast: bool,
    lookahead: Option<RawPacket>,
}

impl CaptureProducer {
    /// Binds a UDP listener at `addr` with the spec's 11 s receive
    /// timeout and configures the producer to assemble `ntime_gulp`
    /// integrations per gulp.
    pub fn new(
        addr: SocketAddr,
        ntime_gulp: usize,
        fast: bool,
        ring: Arc<Ring<dr_proto::RawGulp>>,
        fill: Arc<FillLevelQueue>,
    ) -> Result<Self, CaptureError> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(CaptureError::Bind)?;
        socket.set_reuse_address(true).map_err(CaptureError::Bind)?;
        socket.bind(&addr.into()).map_err(CaptureError::Bind)?;
        socket.set_read_timeout(Some(RECV_TIMEOUT)).map_err(CaptureError::Bind)?;
        Ok(Self {
            socket: socket.into(),
            ring,
            fill,
            ntime_gulp,
            fast,
            lookahead: None,
        })
    }

    /// Gulp slot depth recommended for this producer's configuration,
    /// used by callers sizing the ring (spec §4.2's "slot depth").
    pub fn recommended_ring_config(&self, nbl: u32, nchan: u32) -> RingConfig {
        let bytes = self.ntime_gulp * nbl as usize * nchan as usize * 4 * 8;
        RingConfig::new(bytes.max(1), 4)
    }

    fn recv_raw(&self) -> std::io::Result<Option<RawPacket>> {
        let mut buf = vec![0u8; COR_MTU];
        match self.socket.recv_from(&mut buf) {
            Ok((n, _from)) => {
                let header = match CorHeader::parse(&buf[..n]) {
                    Some(h) => h,
                    None => return Ok(None),
                };
                let payload_start = crate::wire::HEADER_BYTES;
                let payload = buf[payload_start..n].to_vec();
                Ok(Some(RawPacket { header, payload }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Pulls the packet for `expected_seq`, absorbing drops and stale
    /// duplicates transparently (spec §4.2 "transient packet loss is
    /// absorbed silently").
    fn next_slot(&mut self, expected_seq: i64, current: &CorHeader, shutdown: &ShutdownEvent) -> Result<Slot, CaptureError> {
        loop {
            if shutdown.is_set() {
                return Ok(Slot::Shutdown);
            }
            let pkt = if let Some(p) = self.lookahead.take() {
                p
            } else {
                match self.recv_raw().map_err(CaptureError::Io)? {
                    Some(p) => p,
                    None => continue,
                }
            };

            if pkt.header.seq0 < expected_seq {
                debug!(seq = pkt.header.seq0, expected_seq, "dropping stale duplicate packet");
                continue;
            }
            let retuned = pkt.header.chan0 != current.chan0
                || pkt.header.nchan != current.nchan
                || pkt.header.navg != current.navg;
            if retuned {
                return Ok(Slot::Retune(pkt));
            }
            if pkt.header.seq0 > expected_seq {
                warn!(expected_seq, got = pkt.header.seq0, "missed integration, filling with zeros");
                self.lookahead = Some(pkt);
                return Ok(Slot::Missing);
            }
            return Ok(Slot::Present(pkt));
        }
    }

    fn first_packet(&mut self, shutdown: &ShutdownEvent) -> Result<Option<RawPacket>, CaptureError> {
        if let Some(p) = self.lookahead.take() {
            return Ok(Some(p));
        }
        loop {
            if shutdown.is_set() {
                return Ok(None);
            }
            if let Some(p) = self.recv_raw().map_err(CaptureError::Io)? {
                return Ok(Some(p));
            }
        }
    }

    /// Assembles and publishes gulps for one sequence, starting from
    /// `first`. Returns the first packet of the next sequence if a retune
    /// boundary was hit mid-stream, or `None` on shutdown.
    fn run_sequence(
        &mut self,
        writer: &dr_ring::WriterGuard<dr_proto::RawGulp>,
        first: RawPacket,
        shutdown: &ShutdownEvent,
    ) -> Result<Option<RawPacket>, CaptureError> {
        let current = first.header;
        let header = SequenceHeader::from_first_packet(
            current.time_tag,
            current.seq0,
            current.chan0,
            current.nchan,
            current.navg,
            current.nsrc,
            self.fast,
        );
        info!(time_tag = header.time_tag, chan0 = header.chan0, nchan = header.nchan, "starting sequence");
        let header_bytes = header.to_json().map_err(CaptureError::Header)?;
        let seq = writer.begin_sequence(header_bytes);

        let nbl = current.nsrc as usize;
        let nchan = current.nchan as usize;
        let mut pending = Some(first);
        let mut next_seq = current.seq0;

        loop {
            let mut data = Array4::<Complex<i32>>::zeros((self.ntime_gulp, nbl, nchan, 4));
            let mut good_bytes = 0usize;
            let mut missing_bytes = 0usize;
            let expected_payload = current.payload_bytes();

            for t in 0..self.ntime_gulp {
                let slot = if let Some(p) = pending.take() {
                    if p.header.seq0 == next_seq {
                        Slot::Present(p)
                    } else {
                        self.lookahead = Some(p);
                        Slot::Missing
                    }
                } else {
                    self.next_slot(next_seq, &current, shutdown)?
                };

                match slot {
                    Slot::Present(pkt) => {
                        good_bytes += pkt.payload.len().min(expected_payload);
                        missing_bytes += expected_payload.saturating_sub(pkt.payload.len());
                        fill_integration(&mut data, t, &pkt.payload);
                    }
                    Slot::Missing => {
                        missing_bytes += expected_payload;
                    }
                    Slot::Retune(next) => {
                        drop(seq);
                        return Ok(Some(next));
                    }
                    Slot::Shutdown => {
                        drop(seq);
                        return Ok(None);
                    }
                }
                next_seq += 1;
            }

            let fill_level = if good_bytes + missing_bytes == 0 {
                1.0
            } else {
                good_bytes as f32 / (good_bytes + missing_bytes) as f32
            };
            self.fill.publish(fill_level);

            let size = data.len() * std::mem::size_of::<Complex<i32>>();
            let mut span = seq.reserve(size)?;
            span.write(dr_proto::RawGulp { data });

            drop(span);
            if shutdown.is_set() {
                drop(seq);
                return Ok(None);
            }
        }
    }
}

/// Writes one integration's worth of samples from a packet payload
/// (big-endian `i32` real/imaginary pairs, baseline-major then
/// channel-major then pol) into `data[t, .., .., ..]`.
fn fill_integration(data: &mut Array4<Complex<i32>>, t: usize, payload: &[u8]) {
    let (_, nbl, nchan, npol) = data.dim();
    let mut offset = 0;
    'fill: for b in 0..nbl {
        for c in 0..nchan {
            for p in 0..npol {
                if offset + 8 > payload.len() {
                    break 'fill;
                }
                let re = i32::from_be_bytes(payload[offset..offset + 4].try_into().unwrap());
                let im = i32::from_be_bytes(payload[offset + 4..offset + 8].try_into().unwrap());
                data[[t, b, c, p]] = Complex::new(re, im);
                offset += 8;
            }
        }
    }
}

impl GulpProducer for CaptureProducer {
    fn run(&mut self, shutdown: &ShutdownEvent) -> Result<(), CaptureError> {
        let writer = self.ring.begin_writing()?;
        let mut pending = self.first_packet(shutdown)?;
        while let Some(first) = pending {
            pending = self.run_sequence(&writer, first, shutdown)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_integration_decodes_known_samples() {
        let mut data = Array4::<Complex<i32>>::zeros((1, 1, 1, 1));
        let mut payload = Vec::new();
        payload.extend_from_slice(&7i32.to_be_bytes());
        payload.extend_from_slice(&(-3i32).to_be_bytes());
        fill_integration(&mut data, 0, &payload);
        assert_eq!(data[[0, 0, 0, 0]], Complex::new(7, -3));
    }

    #[test]
    fn empty_payload_leaves_existing_samples_untouched() {
        let mut data = Array4::<Complex<i32>>::from_elem((1, 1, 2, 1), Complex::new(9, 9));
        fill_integration(&mut data, 0, &[]);
        assert_eq!(data[[0, 0, 0, 0]], Complex::new(9, 9));
    }
}
