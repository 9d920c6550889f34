/// Configuration for a [`crate::Ring`]: gulp size and backlog depth.
///
/// `resize` on the ring is idempotent when called with the values already
/// in effect; otherwise it requires no writer to be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingConfig {
    /// Upper bound on the serialized size of a single gulp, in bytes.
    pub gulp_bytes: usize,
    /// Number of committed-but-possibly-unread frames the ring retains.
    pub backlog: usize,
}

impl RingConfig {
    /// Creates a new configuration.
    ///
    /// # Panics
    ///
    /// Panics if `gulp_bytes` is 0 or `backlog` is 0.
    pub const fn new(gulp_bytes: usize, backlog: usize) -> Self {
        assert!(gulp_bytes > 0, "gulp_bytes must be nonzero");
        assert!(backlog > 0, "backlog must be nonzero");
        Self { gulp_bytes, backlog }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        // A handful of gulps of backlog is enough to absorb the jitter
        // between the slowest diagnostic stage and the writer without
        // growing unbounded memory use.
        Self { gulp_bytes: 32 << 20, backlog: 4 }
    }
}
