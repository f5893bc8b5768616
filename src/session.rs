//! Stream session: configuration, state machine, and producer-context
//! driver.
//!
//! One session plays one stream. `load` parses the container header, primes
//! the ring buffer, and hands back the [`ChunkFeeder`] for the completion
//! context; `tick` is then polled from the producer context (typically once
//! per frame) to keep the buffer fed.

use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::feeder::ChunkFeeder;
use crate::format::StreamFormat;
use crate::refill::{RefillScheduler, RefillStatus};
use crate::ring::{ring_buffer, RingWriter};
use crate::sink::{HardwareSink, FULL_SCALE, MAX_CHANNELS};
use crate::storage::{ReadPoll, StorageSource, SECTOR_SIZE};

/// Poll budget for the bounded busy-waits inside `load` (header read and
/// priming). Generous enough for any settling medium; only a storage source
/// that never completes exhausts it.
const MAX_LOAD_POLLS: usize = 1 << 20;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No stream loaded.
    Unloaded,
    /// Header parsed and channels configured; ring not yet primed.
    Loaded,
    /// Ring primed (or priming); playback not started.
    Priming,
    /// Channels armed and draining.
    Playing,
    /// Channels muted; buffer contents intact.
    Stopped,
}

struct ActiveStream {
    writer: RingWriter,
    scheduler: RefillScheduler,
}

/// Producer half of a stream: owns the configuration, the state machine,
/// the ring's write side and the refill scheduler.
pub struct StreamSession {
    config: StreamConfig,
    state: StreamState,
    format: Option<StreamFormat>,
    active: Option<ActiveStream>,
    channel_mask: u32,
    on_refill: Option<Box<dyn FnMut(usize) + Send>>,
}

impl StreamSession {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            state: StreamState::Unloaded,
            format: None,
            active: None,
            channel_mask: 0,
            on_refill: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Parsed header of the loaded stream, if any.
    pub fn format(&self) -> Option<&StreamFormat> {
        self.format.as_ref()
    }

    /// Channels used by the loaded stream, as a bitmask.
    pub fn channel_mask(&self) -> u32 {
        self.channel_mask
    }

    /// Committed bytes currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.writer.filled_len())
    }

    /// True once a non-looping stream has scheduled its last sector.
    pub fn is_exhausted(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.scheduler.is_exhausted())
    }

    /// Register a hook fired from the producer context with the byte count
    /// of each completed refill.
    pub fn set_refill_hook(&mut self, hook: impl FnMut(usize) + Send + 'static) {
        self.on_refill = Some(Box::new(hook));
    }

    /// Load a stream: locate the file, parse its header, configure channel
    /// panning, and prime the ring buffer so the first `start` cannot
    /// underrun.
    ///
    /// Returns the consumer half. Reloading builds a fresh ring and feeder;
    /// a feeder from an earlier load goes inert. Loading while playing is
    /// rejected: stop first.
    pub fn load<S, H>(&mut self, storage: &mut S, sink: &mut H, path: &str) -> Result<ChunkFeeder>
    where
        S: StorageSource,
        H: HardwareSink,
    {
        if self.state == StreamState::Playing {
            return Err(Error::InvalidState {
                op: "load",
                state: self.state,
            });
        }

        let region = storage.locate(path).map_err(|err| {
            warn!(path, error = %err, "stream not found");
            err
        })?;

        // Synchronous header read: the one intentional blocking wait besides
        // priming, both of which precede playback.
        let mut header = vec![0u8; SECTOR_SIZE];
        storage.read_async(region.start_block, 1)?;
        wait_complete(storage, &mut header)?;

        // Nothing is mutated before this check: a bad container leaves the
        // session exactly as it was.
        let format = StreamFormat::parse(&header)?;
        if format.channel_count > MAX_CHANNELS {
            return Err(Error::Format(format!(
                "{} channels exceed the {MAX_CHANNELS} hardware playback channels",
                format.channel_count
            )));
        }

        let chunk_size = format.chunk_size();
        let capacity = self.config.buffer_capacity / chunk_size * chunk_size;
        if capacity < chunk_size * 2 {
            return Err(Error::Config(format!(
                "buffer capacity {:#x} holds fewer than two {chunk_size}-byte chunks",
                self.config.buffer_capacity
            )));
        }
        if self.config.threshold_bytes() > capacity {
            return Err(Error::Config(format!(
                "refill threshold of {} sectors exceeds the {capacity}-byte buffer",
                self.config.refill_threshold
            )));
        }

        // Use the first N channels, panned hard left/right in pairs (the
        // stream is assumed to carry one or more stereo tracks).
        let mut mask = 0u32;
        for channel in 0..format.channel_count {
            mask = (mask << 1) | 1;
            let (left, right) = if channel % 2 == 1 {
                (0, FULL_SCALE)
            } else {
                (FULL_SCALE, 0)
            };
            sink.set_channel_volume(channel, left, right);
        }
        self.state = StreamState::Loaded;

        let (writer, reader) = ring_buffer(capacity);
        let scheduler = RefillScheduler::new(
            region.start_block + 1,
            format.stream_sectors(),
            self.config.looping,
            self.config.refill_threshold,
        );
        let feeder = ChunkFeeder::new(reader, format.interleave as usize, mask, self.config.hardware_base);

        self.channel_mask = mask;
        self.format = Some(format);
        self.active = Some(ActiveStream { writer, scheduler });
        self.state = StreamState::Priming;

        // Prime: poll until the free space drops below the refill threshold
        // (the buffer is as full as the scheduler will make it) or the
        // stream is exhausted, so the first `start` cannot underrun.
        if let Err(err) = self.prime(storage) {
            self.reset();
            return Err(err);
        }
        debug!(buffered = self.buffered_len(), "stream primed");

        Ok(feeder)
    }

    fn prime<S: StorageSource>(&mut self, storage: &mut S) -> Result<()> {
        for _ in 0..MAX_LOAD_POLLS {
            match self.poll_scheduler(storage)? {
                RefillStatus::Throttled | RefillStatus::EndOfStream => return Ok(()),
                RefillStatus::Busy
                | RefillStatus::Issued(_)
                | RefillStatus::Discarded
                | RefillStatus::Idle => {}
            }
        }
        Err(Error::PrimingStalled)
    }

    /// Begin or resume playback: Priming/Stopped → Playing, channels armed.
    ///
    /// Once unmuted, the hardware raises a drained signal per channel; route
    /// those to [`ChunkFeeder::on_channel_drained`] to put data in motion.
    /// `resume` continues a stopped stream where it left off; the first
    /// start of a freshly primed stream ignores it.
    pub fn start<H: HardwareSink>(&mut self, sink: &mut H, resume: bool) -> Result<()> {
        match self.state {
            StreamState::Priming | StreamState::Stopped => {}
            state => {
                return Err(Error::InvalidState { op: "start", state });
            }
        }
        sink.unmute(self.channel_mask);
        self.state = StreamState::Playing;
        debug!(resume, mask = self.channel_mask, "stream started");
        Ok(())
    }

    /// Stop playback. Safe to call in any state.
    ///
    /// Mutes the stream's channels before anything else, so no further
    /// completion signals can race the transition. Buffer contents are left
    /// intact for a later `start(resume = true)`.
    pub fn stop<H: HardwareSink>(&mut self, sink: &mut H) {
        sink.mute(self.channel_mask);
        if self.state == StreamState::Playing {
            self.state = StreamState::Stopped;
            debug!("stream stopped");
        }
    }

    /// Producer-context poll: runs the refill scheduler while priming or
    /// playing, a no-op otherwise.
    pub fn tick<S: StorageSource>(&mut self, storage: &mut S) -> Result<RefillStatus> {
        match self.state {
            StreamState::Priming | StreamState::Playing => self.poll_scheduler(storage),
            _ => Ok(RefillStatus::Idle),
        }
    }

    fn poll_scheduler<S: StorageSource>(&mut self, storage: &mut S) -> Result<RefillStatus> {
        let Some(active) = self.active.as_mut() else {
            return Ok(RefillStatus::Idle);
        };
        let status = active.scheduler.poll(storage, &mut active.writer)?;
        let committed = active.scheduler.take_committed();
        if committed > 0 {
            if let Some(hook) = self.on_refill.as_mut() {
                hook(committed);
            }
        }
        Ok(status)
    }

    fn reset(&mut self) {
        self.state = StreamState::Unloaded;
        self.format = None;
        self.active = None;
        self.channel_mask = 0;
    }
}

/// Bounded busy-wait for the synchronous header read inside `load`.
fn wait_complete<S: StorageSource>(storage: &mut S, dest: &mut [u8]) -> Result<()> {
    for _ in 0..MAX_LOAD_POLLS {
        match storage.poll_read(dest) {
            ReadPoll::Busy => {}
            ReadPoll::Complete(Ok(())) => return Ok(()),
            ReadPoll::Complete(Err(err)) => return Err(Error::Storage(err)),
            ReadPoll::Idle => return Err(Error::PrimingStalled),
        }
    }
    Err(Error::PrimingStalled)
}
