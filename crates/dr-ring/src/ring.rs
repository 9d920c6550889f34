use crate::{RingConfig, RingError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// A single committed frame in the fabric: one gulp plus the sequence
/// metadata it was produced under, or an end-of-sequence marker.
struct Frame<T> {
    id: u64,
    sequence_id: u64,
    header: Option<Arc<[u8]>>,
    payload: Option<Arc<T>>,
    /// Actual byte size of the committed span; may be smaller than the
    /// ring's configured `gulp_bytes` for the final span of a sequence.
    size: usize,
    end_of_sequence: bool,
}

struct State<T> {
    config: RingConfig,
    frames: VecDeque<Frame<T>>,
    next_id: u64,
    sequence_id: u64,
    header: Option<Arc<[u8]>>,
    reader_cursors: Vec<Arc<AtomicU64>>,
    closed: bool,
}

/// A named, bounded ring of gulp frames: one writer capability, any number
/// of independent readers.
pub struct Ring<T> {
    state: Mutex<State<T>>,
    data_cv: Condvar,
    space_cv: Condvar,
    writing: AtomicBool,
}

impl<T> Ring<T> {
    /// Creates a new ring with the given configuration.
    pub fn new(config: RingConfig) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                config,
                frames: VecDeque::new(),
                next_id: 0,
                sequence_id: 0,
                header: None,
                reader_cursors: Vec::new(),
                closed: false,
            }),
            data_cv: Condvar::new(),
            space_cv: Condvar::new(),
            writing: AtomicBool::new(false),
        })
    }

    /// Sets the gulp size and backlog depth. Idempotent when the requested
    /// configuration matches what's already in effect; otherwise requires
    /// that no writer currently be active.
    pub fn resize(self: &Arc<Self>, config: RingConfig) -> Result<(), RingError> {
        let mut state = self.state.lock().unwrap();
        if state.config == config {
            return Ok(());
        }
        if self.writing.load(Ordering::Acquire) {
            return Err(RingError::ResizeWhileWriting);
        }
        state.config = config;
        Ok(())
    }

    /// Acquires the sole writer capability for this ring.
    pub fn begin_writing(self: &Arc<Self>) -> Result<WriterGuard<T>, RingError> {
        if self
            .writing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RingError::AlreadyWriting);
        }
        Ok(WriterGuard { ring: Arc::clone(self) })
    }

    /// Opens a new read stream with its own, independently-advancing cursor.
    ///
    /// A fresh reader starts at the live tail: it observes gulps committed
    /// from this point forward, not historical backlog. When `guarantee` is
    /// set, the writer blocks rather than overwrite a span this reader has
    /// not yet consumed.
    pub fn read(self: &Arc<Self>, guarantee: bool) -> ReadStream<T> {
        let mut state = self.state.lock().unwrap();
        let cursor = Arc::new(AtomicU64::new(state.next_id));
        if guarantee {
            state.reader_cursors.push(Arc::clone(&cursor));
        }
        ReadStream {
            ring: Arc::clone(self),
            cursor,
            guarantee,
            last_sequence_seen: None,
        }
    }

    /// Closes the ring: producers stop being able to reserve; readers drain
    /// remaining frames and then observe `None`.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.data_cv.notify_all();
        self.space_cv.notify_all();
    }

    fn oldest_unread_id(state: &State<T>) -> u64 {
        state
            .reader_cursors
            .iter()
            .map(|c| c.load(Ordering::Acquire))
            .min()
            .unwrap_or(state.next_id)
    }

    fn commit(self: &Arc<Self>, sequence_id: u64, payload: T, size: usize, end_of_sequence: bool) {
        let mut state = self.state.lock().unwrap();
        loop {
            let backlog = state.config.backlog;
            if state.frames.len() < backlog {
                break;
            }
            let oldest_unread = Self::oldest_unread_id(&state);
            let front_id = state.frames.front().map(|f| f.id).unwrap_or(0);
            if oldest_unread > front_id || state.reader_cursors.is_empty() {
                // No guaranteed reader is still depending on the oldest
                // frame: safe to drop it to make room.
                state.frames.pop_front();
                break;
            }
            // A guaranteed reader still needs the oldest frame: block the
            // writer rather than overwrite unread data.
            state = self.space_cv.wait(state).unwrap();
        }

        let id = state.next_id;
        state.next_id += 1;
        let header = state.header.clone();
        state.frames.push_back(Frame {
            id,
            sequence_id,
            header,
            payload: Some(Arc::new(payload)),
            size,
            end_of_sequence,
        });
        drop(state);
        self.data_cv.notify_all();
    }

}

/// Scoped writer capability. Only one may exist per ring at a time.
pub struct WriterGuard<T> {
    ring: Arc<Ring<T>>,
}

impl<T> WriterGuard<T> {
    /// Begins a new sequence, publishing its header to readers before any
    /// gulp of the sequence becomes visible.
    pub fn begin_sequence(&self, header_bytes: Vec<u8>) -> SequenceGuard<'_, T> {
        let mut state = self.ring.state.lock().unwrap();
        state.sequence_id += 1;
        let sequence_id = state.sequence_id;
        state.header = Some(Arc::from(header_bytes.into_boxed_slice()));
        drop(state);
        SequenceGuard { writer: self, sequence_id }
    }
}

impl<T> Drop for WriterGuard<T> {
    fn drop(&mut self) {
        self.ring.writing.store(false, Ordering::Release);
    }
}

/// Scoped sequence capability, obtained from [`WriterGuard::begin_sequence`].
///
/// Dropping it pushes an end-of-sequence marker so every reader observes a
/// clean boundary and loops to the next sequence's header.
pub struct SequenceGuard<'a, T> {
    writer: &'a WriterGuard<T>,
    sequence_id: u64,
}

impl<'a, T> SequenceGuard<'a, T> {
    /// Reserves a span for the next gulp of this sequence.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::GulpTooLarge`] if `size` exceeds the ring's
    /// configured `gulp_bytes`.
    pub fn reserve(&self, size: usize) -> Result<Reservation<T>, RingError> {
        let capacity = self.writer.ring.state.lock().unwrap().config.gulp_bytes;
        if size > capacity {
            return Err(RingError::GulpTooLarge { requested: size, capacity });
        }
        Ok(Reservation {
            ring: Arc::clone(&self.writer.ring),
            sequence_id: self.sequence_id,
            size,
            payload: None,
        })
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }
}

impl<'a, T> Drop for SequenceGuard<'a, T> {
    fn drop(&mut self) {
        // Zero-sized marker payload is never observed by readers; only the
        // `end_of_sequence` flag matters.
        let ring = Arc::clone(&self.writer.ring);
        let mut state = ring.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.frames.push_back(Frame {
            id,
            sequence_id: self.sequence_id,
            header: None,
            payload: None,
            size: 0,
            end_of_sequence: true,
        });
        drop(state);
        ring.data_cv.notify_all();
    }
}

/// A zero-copy producer handle for a single gulp. Writing is done by moving
/// the payload in with [`Reservation::write`]; on scope exit the span is
/// committed atomically and becomes visible in order to every reader.
pub struct Reservation<T> {
    ring: Arc<Ring<T>>,
    sequence_id: u64,
    size: usize,
    payload: Option<T>,
}

impl<T> Reservation<T> {
    pub fn write(&mut self, value: T) {
        self.payload = Some(value);
    }
}

impl<T> Drop for Reservation<T> {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            self.ring.commit(self.sequence_id, payload, self.size, false);
        }
    }
}

/// One committed gulp as observed by a reader.
pub struct Span<T> {
    pub sequence_id: u64,
    pub header: Arc<[u8]>,
    pub payload: Arc<T>,
    pub size: usize,
    /// True for the first span a given [`ReadStream`] observes in a new
    /// sequence; consumers use this to (re-)install per-sequence state such
    /// as pipeline lag.
    pub first_of_sequence: bool,
}

/// A lazy, restartable-per-sequence stream of read spans with its own
/// cursor, independent of every other reader on the same ring.
pub struct ReadStream<T> {
    ring: Arc<Ring<T>>,
    cursor: Arc<AtomicU64>,
    guarantee: bool,
    last_sequence_seen: Option<u64>,
}

impl<T> ReadStream<T> {
    /// Blocks until the next gulp span is available, the ring is closed and
    /// drained, or an end-of-sequence marker is skipped transparently.
    ///
    /// Every reader shares the same `state.frames` log and reads it by
    /// index off its own cursor — frames are never removed here, only in
    /// [`Ring::commit`]'s eviction, so N concurrent readers each observe
    /// every committed gulp instead of only a disjoint subset of them.
    pub fn next_span(&mut self) -> Option<Span<T>> {
        loop {
            let mut state = self.ring.state.lock().unwrap();
            let (id, sequence_id, header, payload, size, end_of_sequence) = loop {
                let want = self.cursor.load(Ordering::Relaxed);
                match state.frames.front().map(|f| f.id) {
                    Some(front_id) if want < front_id => {
                        // The frame this reader wanted was evicted by
                        // backpressure before it got here (only possible
                        // for a non-guaranteed reader); skip ahead to what
                        // remains rather than wait on it forever.
                        self.cursor.store(front_id, Ordering::Relaxed);
                    }
                    Some(front_id) => {
                        let idx = (want - front_id) as usize;
                        match state.frames.get(idx) {
                            Some(frame) => {
                                break (
                                    frame.id,
                                    frame.sequence_id,
                                    frame.header.clone(),
                                    frame.payload.clone(),
                                    frame.size,
                                    frame.end_of_sequence,
                                );
                            }
                            None if state.closed => return None,
                            None => state = self.ring.data_cv.wait(state).unwrap(),
                        }
                    }
                    None if state.closed => return None,
                    None => state = self.ring.data_cv.wait(state).unwrap(),
                }
            };
            drop(state);

            self.cursor.store(id + 1, Ordering::Release);
            self.ring.space_cv.notify_all();

            if end_of_sequence {
                self.last_sequence_seen = None;
                continue;
            }

            let first_of_sequence = self.last_sequence_seen != Some(sequence_id);
            self.last_sequence_seen = Some(sequence_id);

            return Some(Span {
                sequence_id,
                header: header.expect("gulp frame always carries a header"),
                payload: payload.expect("gulp frame always carries a payload"),
                size,
                first_of_sequence,
            });
        }
    }
}

impl<T> Drop for ReadStream<T> {
    fn drop(&mut self) {
        if self.guarantee {
            let mut state = self.ring.state.lock().unwrap();
            state.reader_cursors.retain(|c| !Arc::ptr_eq(c, &self.cursor));
            drop(state);
            self.ring.space_cv.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes() -> Vec<u8> {
        b"{}".to_vec()
    }

    #[test]
    fn single_writer_enforced() {
        let ring: Arc<Ring<u32>> = Ring::new(RingConfig::new(64, 4));
        let _w1 = ring.begin_writing().unwrap();
        assert!(matches!(ring.begin_writing(), Err(RingError::AlreadyWriting)));
    }

    #[test]
    fn reader_sees_gulps_in_order() {
        let ring: Arc<Ring<u32>> = Ring::new(RingConfig::new(64, 4));
        let mut reader = ring.read(true);

        let writer = ring.begin_writing().unwrap();
        {
            let seq = writer.begin_sequence(header_bytes());
            for v in 0..3u32 {
                let mut r = seq.reserve(4).unwrap();
                r.write(v);
            }
        }
        drop(writer);

        for expected in 0..3u32 {
            let span = reader.next_span().unwrap();
            assert_eq!(*span.payload, expected);
            assert_eq!(span.first_of_sequence, expected == 0);
        }
    }

    #[test]
    fn final_short_span_is_reported_with_its_true_size() {
        let ring: Arc<Ring<u32>> = Ring::new(RingConfig::new(64, 4));
        let mut reader = ring.read(true);
        let writer = ring.begin_writing().unwrap();
        {
            let seq = writer.begin_sequence(header_bytes());
            let mut full = seq.reserve(64).unwrap();
            full.write(1);
            drop(full);
            let mut short = seq.reserve(16).unwrap();
            short.write(2);
        }
        let first = reader.next_span().unwrap();
        assert_eq!(first.size, 64);
        let second = reader.next_span().unwrap();
        assert_eq!(second.size, 16);
    }

    #[test]
    fn resize_is_idempotent_for_same_config() {
        let ring: Arc<Ring<u32>> = Ring::new(RingConfig::new(64, 4));
        assert!(ring.resize(RingConfig::new(64, 4)).is_ok());
    }

    #[test]
    fn resize_rejected_while_writing() {
        let ring: Arc<Ring<u32>> = Ring::new(RingConfig::new(64, 4));
        let _w = ring.begin_writing().unwrap();
        assert!(matches!(
            ring.resize(RingConfig::new(128, 4)),
            Err(RingError::ResizeWhileWriting)
        ));
    }

    #[test]
    fn every_reader_observes_every_gulp() {
        // Several stages (writer, statistics, spectra, baseline, imager)
        // each open their own read stream on one ring and must all see the
        // same sequence, not a disjoint share of it.
        let ring: Arc<Ring<u32>> = Ring::new(RingConfig::new(64, 8));
        let mut r1 = ring.read(true);
        let mut r2 = ring.read(true);
        let mut r3 = ring.read(false);
        let writer = ring.begin_writing().unwrap();
        {
            let seq = writer.begin_sequence(header_bytes());
            for v in 0..5u32 {
                let mut r = seq.reserve(4).unwrap();
                r.write(v);
            }
        }
        drop(writer);

        // r1 fully drains the sequence first; the frames it read must still
        // be there afterward for r2 and r3 to read in full, in order.
        for expected in 0..5u32 {
            assert_eq!(*r1.next_span().unwrap().payload, expected);
        }
        for expected in 0..5u32 {
            assert_eq!(*r2.next_span().unwrap().payload, expected);
        }
        for expected in 0..5u32 {
            assert_eq!(*r3.next_span().unwrap().payload, expected);
        }
    }

    #[test]
    fn independent_readers_do_not_block_each_other() {
        let ring: Arc<Ring<u32>> = Ring::new(RingConfig::new(64, 2));
        let mut slow = ring.read(true);
        let mut fast = ring.read(true);
        let writer = ring.begin_writing().unwrap();
        {
            let seq = writer.begin_sequence(header_bytes());
            let mut r = seq.reserve(4).unwrap();
            r.write(7u32);
        }
        drop(writer);

        // fast reader drains immediately without waiting on slow, and the
        // frame is still there afterward for slow to read too.
        let span = fast.next_span().unwrap();
        assert_eq!(*span.payload, 7);
        let span = slow.next_span().unwrap();
        assert_eq!(*span.payload, 7);
    }

    #[test]
    fn guaranteed_reader_forces_writer_to_wait_for_it() {
        let ring: Arc<Ring<u32>> = Ring::new(RingConfig::new(64, 1));
        let mut lagging = ring.read(true);
        let writer = ring.begin_writing().unwrap();
        let seq = writer.begin_sequence(header_bytes());
        {
            let mut r0 = seq.reserve(4).unwrap();
            r0.write(0u32);
        }

        // A `Reservation` only clones the ring's `Arc`, so it can move into
        // another thread without `seq`'s borrow of `writer` going along
        // with it. Backlog depth is 1 and `lagging` hasn't consumed the
        // first gulp yet, so dropping (committing) this one must block
        // until it does.
        let mut r1 = seq.reserve(4).unwrap();
        r1.write(1u32);
        let committed_second = Arc::new(AtomicBool::new(false));
        let committed_second_writer = Arc::clone(&committed_second);
        let handle = std::thread::spawn(move || {
            drop(r1);
            committed_second_writer.store(true, Ordering::SeqCst);
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(!committed_second.load(Ordering::SeqCst));

        assert_eq!(*lagging.next_span().unwrap().payload, 0);
        handle.join().unwrap();
        assert!(committed_second.load(Ordering::SeqCst));
        assert_eq!(*lagging.next_span().unwrap().payload, 1);
    }

    #[test]
    fn non_guaranteed_reader_skips_ahead_past_evicted_frames() {
        let ring: Arc<Ring<u32>> = Ring::new(RingConfig::new(64, 1));
        let mut lossy = ring.read(false);
        let writer = ring.begin_writing().unwrap();
        let seq = writer.begin_sequence(header_bytes());
        for v in 0..3u32 {
            let mut r = seq.reserve(4).unwrap();
            r.write(v);
        }
        drop(seq);
        drop(writer);

        // Backlog depth 1 with no guaranteed reader means every commit
        // after the first immediately evicts the previous frame; a
        // non-guaranteed reader must skip ahead to whatever is left
        // instead of hanging on frames that no longer exist.
        let span = lossy.next_span().unwrap();
        assert_eq!(*span.payload, 2);
    }
}
