//! Interleaved container header parsing.
//!
//! The payload is laid out on the medium as a sequence of chunks, each
//! holding one `interleave`-byte slice per channel, starting one block after
//! the header. The header itself is fixed at 48 bytes; see [`StreamFormat`].

use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::SECTOR_SIZE;

/// Magic of the interleaved container variant (ASCII "VAGi").
pub const STREAM_MAGIC: u32 = 0x6947_4156;

/// Size of the fixed container header in bytes.
pub const HEADER_SIZE: usize = 48;

// Hardware ADPCM frame: 16 bytes decode to 28 samples.
const FRAME_BYTES: u64 = 16;
const FRAME_SAMPLES: u64 = 28;

/// Parsed container header plus derived stream geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFormat {
    /// Container format version.
    pub version: u32,
    /// Bytes per channel per chunk.
    pub interleave: u32,
    /// Per-channel payload size in bytes.
    pub total_size: u32,
    /// Playback rate in Hz.
    pub sample_rate: u32,
    /// Channel count; a stored value of 0 is a documented alias for plain
    /// stereo and has already been normalized to 2 here.
    pub channel_count: u32,
    /// Informational stream name.
    pub name: String,
}

impl StreamFormat {
    /// Parse the fixed header from the first block of the container.
    ///
    /// Nothing else is inspected or mutated before the magic check; a
    /// mismatch is fatal at load.
    pub fn parse(header: &[u8]) -> Result<Self> {
        if header.len() < HEADER_SIZE {
            return Err(Error::Format(format!(
                "header truncated: {} of {HEADER_SIZE} bytes",
                header.len()
            )));
        }

        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        if magic != STREAM_MAGIC {
            return Err(Error::Format(format!(
                "bad magic {magic:#010x}, expected {STREAM_MAGIC:#010x}"
            )));
        }

        let version = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let interleave = u32::from_le_bytes(header[8..12].try_into().unwrap());
        // size and sample rate are stored big-endian
        let total_size = u32::from_be_bytes(header[12..16].try_into().unwrap());
        let sample_rate = u32::from_be_bytes(header[16..20].try_into().unwrap());
        // header[20..30] is reserved padding
        let channels = u16::from_le_bytes(header[30..32].try_into().unwrap());
        let channel_count = if channels == 0 { 2 } else { u32::from(channels) };

        let name = String::from_utf8_lossy(&header[32..HEADER_SIZE])
            .trim_end_matches('\0')
            .to_string();

        if interleave == 0 || interleave as usize % SECTOR_SIZE != 0 {
            return Err(Error::Format(format!(
                "unsupported interleave {interleave}: must be a non-zero multiple of {SECTOR_SIZE}"
            )));
        }
        if total_size == 0 {
            return Err(Error::Format("empty stream payload".into()));
        }
        if sample_rate == 0 {
            return Err(Error::Format("sample rate of 0 Hz".into()));
        }

        let format = Self {
            version,
            interleave,
            total_size,
            sample_rate,
            channel_count,
            name,
        };
        debug!(
            name = %format.name,
            channels = format.channel_count,
            interleave = format.interleave,
            sample_rate = format.sample_rate,
            chunks = format.chunk_count(),
            "parsed stream header"
        );
        Ok(format)
    }

    /// Number of chunks in the stream (the final one may be padded).
    pub fn chunk_count(&self) -> u64 {
        u64::from(self.total_size).div_ceil(u64::from(self.interleave))
    }

    /// Bytes per chunk: one interleave stride per channel.
    pub fn chunk_size(&self) -> usize {
        self.interleave as usize * self.channel_count as usize
    }

    /// Stream length on the medium in whole sectors.
    pub fn stream_sectors(&self) -> u64 {
        let bytes =
            u64::from(self.channel_count) * self.chunk_count() * u64::from(self.interleave);
        bytes.div_ceil(SECTOR_SIZE as u64)
    }

    /// Per-channel sample count.
    pub fn sample_count(&self) -> u64 {
        u64::from(self.total_size) / FRAME_BYTES * FRAME_SAMPLES
    }

    /// Whole-stream duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.sample_count() as f64 / f64::from(self.sample_rate)
    }
}
