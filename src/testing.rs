//! Deterministic test doubles for the two hardware capabilities, plus
//! container image builders. Compiled for tests only.

use std::collections::{BTreeMap, HashMap};

use crate::error::StorageError;
use crate::format::{HEADER_SIZE, STREAM_MAGIC};
use crate::sink::HardwareSink;
use crate::storage::{ReadPoll, StorageRegion, StorageSource, SECTOR_SIZE};

struct PendingRead {
    block: u64,
    sectors: usize,
    countdown: usize,
}

/// In-memory block storage with a scriptable completion behaviour: fixed
/// poll latency, injectable read failures, and an indefinite stall switch.
pub struct SimStorage {
    blocks: BTreeMap<u64, [u8; SECTOR_SIZE]>,
    files: HashMap<String, StorageRegion>,
    pending: Option<PendingRead>,
    /// Polls a read stays busy before completing.
    pub latency: usize,
    /// While set, every poll reports busy and nothing completes.
    pub stalled: bool,
    /// Number of upcoming completions to fail with a medium error.
    pub fail_reads: usize,
    /// Log of every issued read as `(block, sectors)`.
    pub issued: Vec<(u64, usize)>,
}

impl SimStorage {
    pub fn new(latency: usize) -> Self {
        Self {
            blocks: BTreeMap::new(),
            files: HashMap::new(),
            pending: None,
            latency,
            stalled: false,
            fail_reads: 0,
            issued: Vec::new(),
        }
    }

    /// Place raw bytes on the medium starting at `block`, zero-padding the
    /// final sector.
    pub fn place_blocks(&mut self, block: u64, data: &[u8]) {
        for (i, part) in data.chunks(SECTOR_SIZE).enumerate() {
            let mut sector = [0u8; SECTOR_SIZE];
            sector[..part.len()].copy_from_slice(part);
            self.blocks.insert(block + i as u64, sector);
        }
    }

    /// Register a locatable file and place its contents.
    pub fn add_file(&mut self, path: &str, start_block: u64, data: &[u8]) {
        self.files.insert(
            path.to_string(),
            StorageRegion {
                start_block,
                size_bytes: data.len() as u64,
            },
        );
        self.place_blocks(start_block, data);
    }
}

impl StorageSource for SimStorage {
    fn locate(&mut self, path: &str) -> Result<StorageRegion, StorageError> {
        self.files
            .get(path)
            .copied()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn read_async(&mut self, block: u64, sectors: usize) -> Result<(), StorageError> {
        if self.pending.is_some() {
            return Err(StorageError::Outstanding);
        }
        self.issued.push((block, sectors));
        self.pending = Some(PendingRead {
            block,
            sectors,
            countdown: self.latency,
        });
        Ok(())
    }

    fn poll_read(&mut self, dest: &mut [u8]) -> ReadPoll {
        let Some(pending) = self.pending.as_mut() else {
            return ReadPoll::Idle;
        };
        if self.stalled {
            return ReadPoll::Busy;
        }
        if pending.countdown > 0 {
            pending.countdown -= 1;
            return ReadPoll::Busy;
        }
        let PendingRead { block, sectors, .. } = self.pending.take().unwrap();
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return ReadPoll::Complete(Err(StorageError::Medium));
        }
        assert!(dest.len() >= sectors * SECTOR_SIZE, "poll_read dest too short");
        for (i, out) in dest.chunks_mut(SECTOR_SIZE).take(sectors).enumerate() {
            match self.blocks.get(&(block + i as u64)) {
                Some(sector) => out.copy_from_slice(&sector[..out.len()]),
                None => out.fill(0),
            }
        }
        ReadPoll::Complete(Ok(()))
    }
}

/// One `upload_and_continue` call as seen by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub channel: u32,
    pub address: u32,
    pub data: Vec<u8>,
}

/// Mute/unmute calls in arrival order, for asserting call ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    Mute(u32),
    Unmute(u32),
}

/// Hardware sink that records every call.
#[derive(Default)]
pub struct RecordingSink {
    pub uploads: Vec<Upload>,
    pub volumes: Vec<(u32, u16, u16)>,
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    /// Every byte uploaded to `channel`, in upload order.
    pub fn channel_bytes(&self, channel: u32) -> Vec<u8> {
        self.uploads
            .iter()
            .filter(|u| u.channel == channel)
            .flat_map(|u| u.data.iter().copied())
            .collect()
    }
}

impl HardwareSink for RecordingSink {
    fn set_channel_volume(&mut self, channel: u32, left: u16, right: u16) {
        self.volumes.push((channel, left, right));
    }

    fn upload_and_continue(&mut self, channel: u32, address: u32, data: &[u8]) {
        self.uploads.push(Upload {
            channel,
            address,
            data: data.to_vec(),
        });
    }

    fn mute(&mut self, channel_mask: u32) {
        self.events.push(SinkEvent::Mute(channel_mask));
    }

    fn unmute(&mut self, channel_mask: u32) {
        self.events.push(SinkEvent::Unmute(channel_mask));
    }
}

/// Build a valid 48-byte container header.
pub fn build_header(
    channels: u16,
    interleave: u32,
    total_size: u32,
    sample_rate: u32,
    name: &str,
) -> Vec<u8> {
    let mut header = vec![0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&STREAM_MAGIC.to_le_bytes());
    header[4..8].copy_from_slice(&2u32.to_le_bytes());
    header[8..12].copy_from_slice(&interleave.to_le_bytes());
    header[12..16].copy_from_slice(&total_size.to_be_bytes());
    header[16..20].copy_from_slice(&sample_rate.to_be_bytes());
    header[30..32].copy_from_slice(&channels.to_le_bytes());
    let name_bytes = name.as_bytes();
    let n = name_bytes.len().min(16);
    header[32..32 + n].copy_from_slice(&name_bytes[..n]);
    header
}

/// Build a complete on-medium stream image: one header sector followed by
/// `chunk_count` chunks of `channels` interleaved slices, each slice filled
/// with a pattern distinct per channel, chunk and offset.
///
/// Returns the file bytes and, per channel, the payload bytes the hardware
/// should receive in order.
pub fn build_stream_image(
    channels: u32,
    interleave: u32,
    chunk_count: u32,
    sample_rate: u32,
) -> (Vec<u8>, Vec<Vec<u8>>) {
    let total_size = interleave * chunk_count;
    let header = build_header(channels as u16, interleave, total_size, sample_rate, "TEST");

    let mut file = vec![0u8; SECTOR_SIZE];
    file[..HEADER_SIZE].copy_from_slice(&header);

    let mut per_channel = vec![Vec::new(); channels as usize];
    for k in 0..chunk_count {
        for c in 0..channels {
            let slice: Vec<u8> = (0..interleave)
                .map(|i| (c.wrapping_mul(37) ^ k.wrapping_mul(11) ^ i) as u8)
                .collect();
            per_channel[c as usize].extend_from_slice(&slice);
            file.extend_from_slice(&slice);
        }
    }
    (file, per_channel)
}
