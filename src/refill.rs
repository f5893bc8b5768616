//! Producer-side refill scheduling.
//!
//! Polled once per producer tick. Decides when and how much to fetch from
//! storage, issues the single outstanding asynchronous read into the ring's
//! free span, and commits the span once the read completes. A failed read is
//! discarded without a commit, so storage errors can only delay data, never
//! corrupt the buffer.

use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::ring::RingWriter;
use crate::storage::{ReadPoll, StorageSource, SECTOR_SIZE};

/// Outcome of a single producer poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillStatus {
    /// Nothing to schedule in the current session state.
    Idle,
    /// The previous asynchronous read is still in flight.
    Busy,
    /// Below the batching threshold; no read issued.
    Throttled,
    /// A read of this many sectors was issued.
    Issued(usize),
    /// The previous read failed; its data was discarded and the same sectors
    /// will be re-read on the next poll.
    Discarded,
    /// A non-looping stream has scheduled its last sector.
    EndOfStream,
}

pub(crate) struct RefillScheduler {
    /// First data block of the stream on the medium.
    start_block: u64,
    /// Stream length in sectors.
    stream_sectors: i64,
    /// Logical sector cursor relative to `start_block`. Producer-owned.
    cursor: i64,
    /// Sectors requested by the in-flight read.
    pending_sectors: usize,
    in_flight: bool,
    looping: bool,
    threshold_bytes: usize,
    exhausted: bool,
    /// Bytes committed since the last `take_committed`.
    committed: usize,
}

impl RefillScheduler {
    pub fn new(
        start_block: u64,
        stream_sectors: u64,
        looping: bool,
        refill_threshold: usize,
    ) -> Self {
        Self {
            start_block,
            stream_sectors: stream_sectors as i64,
            cursor: 0,
            pending_sectors: 0,
            in_flight: false,
            looping,
            threshold_bytes: refill_threshold * SECTOR_SIZE,
            exhausted: false,
            committed: 0,
        }
    }

    /// True once a non-looping stream has scheduled its last sector.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Bytes committed since the last call; drives the refill hook.
    pub fn take_committed(&mut self) -> usize {
        std::mem::take(&mut self.committed)
    }

    /// One producer-context poll.
    pub fn poll<S: StorageSource>(
        &mut self,
        storage: &mut S,
        writer: &mut RingWriter,
    ) -> Result<RefillStatus> {
        if self.in_flight {
            let pending_bytes = self.pending_sectors * SECTOR_SIZE;
            // The span start is fixed while a read is in flight (only the
            // consumer moves, and that only lengthens the span), so this is
            // the same region the read was issued into.
            let span = writer.free_span();
            match storage.poll_read(&mut span[..pending_bytes]) {
                ReadPoll::Busy => return Ok(RefillStatus::Busy),
                ReadPoll::Complete(Ok(())) => {
                    writer.commit(pending_bytes);
                    self.committed += pending_bytes;
                    trace!(sectors = self.pending_sectors, "refill committed");
                    self.in_flight = false;
                    self.pending_sectors = 0;
                }
                ReadPoll::Complete(Err(err)) => {
                    // No commit: the ring is untouched and the cursor rewinds
                    // so the same sectors are re-read next poll.
                    warn!(
                        error = %err,
                        sectors = self.pending_sectors,
                        "storage read failed, retrying next poll"
                    );
                    self.cursor -= self.pending_sectors as i64;
                    self.in_flight = false;
                    self.pending_sectors = 0;
                    return Ok(RefillStatus::Discarded);
                }
                ReadPoll::Idle => {
                    warn!("storage dropped an in-flight read, retrying next poll");
                    self.cursor -= self.pending_sectors as i64;
                    self.in_flight = false;
                    self.pending_sectors = 0;
                    return Ok(RefillStatus::Discarded);
                }
            }
        }

        if self.exhausted {
            return Ok(RefillStatus::EndOfStream);
        }

        // Batch reads: wait until the threshold's worth of free space exists
        // so storage seeks are amortized over large transfers.
        if writer.free_len() < self.threshold_bytes {
            return Ok(RefillStatus::Throttled);
        }

        let candidate = writer.free_span().len() / SECTOR_SIZE;
        if candidate == 0 {
            return Ok(RefillStatus::Throttled);
        }

        let mut remaining = self.stream_sectors - self.cursor;
        while remaining <= 0 {
            if !self.looping {
                debug!("stream fully scheduled");
                self.exhausted = true;
                return Ok(RefillStatus::EndOfStream);
            }
            self.cursor -= self.stream_sectors;
            remaining += self.stream_sectors;
        }

        // Never read across the logical end of the stream; the wrapped
        // remainder is a separate read on the following poll.
        let sectors = candidate.min(remaining as usize);
        let block = self.start_block + self.cursor as u64;
        storage.read_async(block, sectors)?;
        self.cursor += sectors as i64;
        self.pending_sectors = sectors;
        self.in_flight = true;
        trace!(block, sectors, "refill issued");
        Ok(RefillStatus::Issued(sectors))
    }

    #[cfg(test)]
    pub(crate) fn set_cursor(&mut self, cursor: i64) {
        self.cursor = cursor;
    }
}
