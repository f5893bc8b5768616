//! Consumer-side chunk feeding.
//!
//! Runs in the hardware-completion context: every time a channel drains its
//! slice, the feeder copies that channel's next `interleave`-byte slice out
//! of the ring into hardware channel memory and tells the channel to keep
//! playing. Once every channel of the current chunk has been served, the
//! whole chunk is released. Nothing here blocks, touches storage, or
//! allocates.

use crate::ring::RingReader;
use crate::sink::HardwareSink;

/// Consumer half of a stream: drains committed chunks into hardware channels.
///
/// Returned by [`StreamSession::load`](crate::StreamSession::load) and owned
/// by the embedding's completion context.
pub struct ChunkFeeder {
    reader: RingReader,
    interleave: usize,
    chunk_size: usize,
    hardware_base: u32,
    channel_mask: u32,
    /// Channels already served from the current chunk.
    served_mask: u32,
    /// Set once per empty episode so underrun is reported exactly once.
    underrun_latched: bool,
    on_underrun: Option<Box<dyn FnMut() + Send>>,
}

impl core::fmt::Debug for ChunkFeeder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChunkFeeder")
            .field("interleave", &self.interleave)
            .field("chunk_size", &self.chunk_size)
            .field("hardware_base", &self.hardware_base)
            .field("channel_mask", &self.channel_mask)
            .field("served_mask", &self.served_mask)
            .field("underrun_latched", &self.underrun_latched)
            .finish_non_exhaustive()
    }
}

impl ChunkFeeder {
    pub(crate) fn new(
        reader: RingReader,
        interleave: usize,
        channel_mask: u32,
        hardware_base: u32,
    ) -> Self {
        let chunk_size = interleave * channel_mask.count_ones() as usize;
        Self {
            reader,
            interleave,
            chunk_size,
            hardware_base,
            channel_mask,
            served_mask: 0,
            underrun_latched: false,
            on_underrun: None,
        }
    }

    /// Register a hook fired once per buffer-empty episode. Policy (mute,
    /// retry, abort) is the caller's; the feeder only reports.
    pub fn set_underrun_hook(&mut self, hook: impl FnMut() + Send + 'static) {
        self.on_underrun = Some(Box::new(hook));
    }

    /// Channels fed by this stream, as a bitmask.
    pub fn channel_mask(&self) -> u32 {
        self.channel_mask
    }

    /// Committed bytes waiting in the ring.
    pub fn buffered_len(&self) -> usize {
        self.reader.filled_len()
    }

    /// True while the buffer is too empty to serve a whole chunk.
    pub fn is_starved(&self) -> bool {
        self.reader.filled_len() < self.chunk_size
    }

    /// Consumer-context entry point: `channel` has drained its slice and
    /// needs the next one.
    ///
    /// Signals for channels outside the stream's mask, and repeated signals
    /// for a channel already served from the current chunk, are ignored.
    pub fn on_channel_drained<H: HardwareSink>(&mut self, sink: &mut H, channel: u32) {
        if channel >= 32 {
            return;
        }
        let bit = 1u32 << channel;
        if self.channel_mask & bit == 0 || self.served_mask & bit != 0 {
            return;
        }

        if self.reader.filled_len() < self.chunk_size {
            if !self.underrun_latched {
                self.underrun_latched = true;
                if let Some(hook) = self.on_underrun.as_mut() {
                    hook();
                }
            }
            return;
        }
        self.underrun_latched = false;

        let chunk = self.reader.chunk(self.chunk_size);
        let offset = channel as usize * self.interleave;
        let slice = &chunk[offset..offset + self.interleave];
        let address = self.hardware_base + channel * self.interleave as u32;
        sink.upload_and_continue(channel, address, slice);

        self.served_mask |= bit;
        if self.served_mask == self.channel_mask {
            self.served_mask = 0;
            self.reader.release(self.chunk_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::ring_buffer;
    use crate::testing::RecordingSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const INTERLEAVE: usize = 64;
    const CHUNK: usize = INTERLEAVE * 2; // stereo

    fn feeder_with_chunks(chunks: usize) -> (ChunkFeeder, crate::ring::RingWriter) {
        let (mut writer, reader) = ring_buffer(CHUNK * 4);
        for k in 0..chunks {
            let span = writer.free_span();
            for (i, slot) in span[..CHUNK].iter_mut().enumerate() {
                // channel 0 slice then channel 1 slice, distinct per chunk
                let channel = i / INTERLEAVE;
                *slot = (channel * 100 + k * 10 + i % INTERLEAVE) as u8;
            }
            writer.commit(CHUNK);
        }
        (ChunkFeeder::new(reader, INTERLEAVE, 0b11, 0x1010), writer)
    }

    #[test]
    fn test_serves_each_channel_its_slice() {
        let (mut feeder, _writer) = feeder_with_chunks(1);
        let mut sink = RecordingSink::default();

        feeder.on_channel_drained(&mut sink, 0);
        feeder.on_channel_drained(&mut sink, 1);

        assert_eq!(sink.uploads.len(), 2);
        let first = &sink.uploads[0];
        assert_eq!(first.channel, 0);
        assert_eq!(first.address, 0x1010);
        assert_eq!(first.data[0], 0);
        let second = &sink.uploads[1];
        assert_eq!(second.channel, 1);
        assert_eq!(second.address, 0x1010 + INTERLEAVE as u32);
        assert_eq!(second.data[0], 100);
    }

    #[test]
    fn test_chunk_released_only_after_all_channels() {
        let (mut feeder, _writer) = feeder_with_chunks(1);
        let mut sink = RecordingSink::default();

        assert_eq!(feeder.buffered_len(), CHUNK);
        feeder.on_channel_drained(&mut sink, 0);
        assert_eq!(feeder.buffered_len(), CHUNK);
        feeder.on_channel_drained(&mut sink, 1);
        assert_eq!(feeder.buffered_len(), 0);
    }

    #[test]
    fn test_repeated_and_foreign_signals_ignored() {
        let (mut feeder, _writer) = feeder_with_chunks(2);
        let mut sink = RecordingSink::default();

        feeder.on_channel_drained(&mut sink, 0);
        feeder.on_channel_drained(&mut sink, 0); // already served this chunk
        feeder.on_channel_drained(&mut sink, 7); // not part of the stream
        feeder.on_channel_drained(&mut sink, 40); // out of mask range

        assert_eq!(sink.uploads.len(), 1);
        assert_eq!(feeder.buffered_len(), 2 * CHUNK);
    }

    #[test]
    fn test_channels_may_fire_in_any_order() {
        let (mut feeder, _writer) = feeder_with_chunks(2);
        let mut sink = RecordingSink::default();

        feeder.on_channel_drained(&mut sink, 1);
        feeder.on_channel_drained(&mut sink, 0);
        feeder.on_channel_drained(&mut sink, 0);
        feeder.on_channel_drained(&mut sink, 1);

        assert_eq!(sink.channel_bytes(0).len(), 2 * INTERLEAVE);
        assert_eq!(sink.channel_bytes(1).len(), 2 * INTERLEAVE);
        // chunk 0 then chunk 1, regardless of firing order
        assert_eq!(sink.channel_bytes(0)[0], 0);
        assert_eq!(sink.channel_bytes(0)[INTERLEAVE], 10);
    }

    #[test]
    fn test_underrun_signaled_exactly_once() {
        let (mut feeder, mut writer) = feeder_with_chunks(1);
        let mut sink = RecordingSink::default();

        let underruns = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&underruns);
        feeder.set_underrun_hook(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        // drain the only chunk
        feeder.on_channel_drained(&mut sink, 0);
        feeder.on_channel_drained(&mut sink, 1);
        assert_eq!(underruns.load(Ordering::Relaxed), 0);

        // the buffer is now empty: one report, not one per signal
        for _ in 0..5 {
            feeder.on_channel_drained(&mut sink, 0);
        }
        assert_eq!(underruns.load(Ordering::Relaxed), 1);

        // new data re-arms the latch
        let span = writer.free_span();
        span[..CHUNK].fill(0xaa);
        writer.commit(CHUNK);
        feeder.on_channel_drained(&mut sink, 0);
        feeder.on_channel_drained(&mut sink, 1);
        assert_eq!(underruns.load(Ordering::Relaxed), 1);

        feeder.on_channel_drained(&mut sink, 0);
        assert_eq!(underruns.load(Ordering::Relaxed), 2);
    }
}
