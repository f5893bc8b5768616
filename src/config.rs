//! Stream session configuration.

use crate::storage::SECTOR_SIZE;

/// Configuration for a stream session.
///
/// Interleave stride, channel count and sample rate are not configured here;
/// they come from the container header at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// First hardware memory location available for channel chunk buffers.
    pub hardware_base: u32,
    /// Ring buffer capacity in bytes (default: 0x18000). Normalized down to
    /// a whole number of chunks at load so no chunk ever straddles the
    /// buffer's physical end.
    pub buffer_capacity: usize,
    /// Minimum free space, in sectors, before a new storage read is issued
    /// (default: 24). Higher values batch reads and amortize seek latency at
    /// the cost of a larger buffer requirement.
    pub refill_threshold: usize,
    /// Wrap back to the stream start instead of ending.
    pub looping: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            hardware_base: 0x1010,
            buffer_capacity: 0x18000,
            refill_threshold: 24,
            looping: false,
        }
    }
}

impl StreamConfig {
    /// Create a config with a custom buffer capacity.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buffer_capacity: bytes,
            ..Default::default()
        }
    }

    /// Refill threshold in bytes.
    pub fn threshold_bytes(&self) -> usize {
        self.refill_threshold * SECTOR_SIZE
    }
}
