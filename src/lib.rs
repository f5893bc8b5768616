//! Chunked multi-channel audio streaming from slow block storage through a
//! fixed set of hardware playback channels.
//!
//! Streams larger than memory are played through a lock-free ring buffer
//! sitting between two execution contexts:
//!
//! - the **producer** polls [`StreamSession::tick`] once per frame; a refill
//!   scheduler batches sector-aligned reads from a [`StorageSource`] into the
//!   ring's free span and commits them on completion,
//! - the **consumer** runs in the hardware completion context; the
//!   [`ChunkFeeder`] answers each channel's drained signal by copying that
//!   channel's next interleave-sized slice into a [`HardwareSink`] channel,
//!   releasing the chunk once every channel is served.
//!
//! Stream geometry (interleave stride, channel count, sample rate) comes from
//! a fixed 48-byte container header parsed by [`StreamFormat`]. A session is
//! driven through a small state machine: [`StreamSession::load`] parses and
//! primes, [`StreamSession::start`] arms the channels, and
//! [`StreamSession::stop`] mutes them while keeping the buffer warm for
//! resume.
//!
//! ```no_run
//! use chunkstream::{StreamConfig, StreamSession};
//! # use chunkstream::{HardwareSink, StorageSource};
//! # fn demo<S: StorageSource, H: HardwareSink>(
//! #     storage: &mut S,
//! #     sink: &mut H,
//! # ) -> chunkstream::Result<()> {
//! let mut session = StreamSession::new(StreamConfig {
//!     looping: true,
//!     ..Default::default()
//! });
//! let feeder = session.load(storage, sink, "\\MUSIC\\BGM.VAG;1")?;
//! // hand `feeder` to the completion context, then:
//! session.start(sink, false)?;
//! loop {
//!     session.tick(storage)?; // once per frame
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod format;

mod config;
mod feeder;
mod refill;
mod ring;
mod session;
mod sink;
mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use config::StreamConfig;
pub use error::{Error, Result, StorageError};
pub use feeder::ChunkFeeder;
pub use format::{StreamFormat, HEADER_SIZE, STREAM_MAGIC};
pub use refill::RefillStatus;
pub use ring::{ring_buffer, RingReader, RingWriter};
pub use session::{StreamSession, StreamState};
pub use sink::{HardwareSink, FULL_SCALE, MAX_CHANNELS};
pub use storage::{ReadPoll, StorageRegion, StorageSource, SECTOR_SIZE};
