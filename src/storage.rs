//! Block storage capability consumed by the producer side.

use crate::error::StorageError;

/// Block size of the storage medium in bytes. All reads are issued in whole
/// sectors and the interleave stride must be a multiple of this.
pub const SECTOR_SIZE: usize = 2048;

/// Location and extent of a file on the medium, as reported by
/// [`StorageSource::locate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageRegion {
    /// First block of the file. The stream payload starts one block later;
    /// the header occupies the first block.
    pub start_block: u64,
    /// File size in bytes.
    pub size_bytes: u64,
}

/// Outcome of polling the single outstanding read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPoll {
    /// No request is outstanding.
    Idle,
    /// The medium is still reading.
    Busy,
    /// The request finished. On success the payload has been copied into the
    /// `dest` buffer passed to [`StorageSource::poll_read`]; on error `dest`
    /// is untouched.
    Complete(Result<(), StorageError>),
}

/// Asynchronous block storage with a single outstanding request.
///
/// This is the deterministic shape of "read N blocks starting at block B
/// into buffer P, report completion via callback": completion is observed by
/// polling, and the payload is delivered into the caller's buffer (the ring's
/// free span) at that point.
pub trait StorageSource {
    /// Resolve a path to its block region.
    fn locate(&mut self, path: &str) -> Result<StorageRegion, StorageError>;

    /// Begin reading `sectors` whole blocks starting at `block`. At most one
    /// request may be outstanding; a second issue fails with
    /// [`StorageError::Outstanding`].
    fn read_async(&mut self, block: u64, sectors: usize) -> Result<(), StorageError>;

    /// Poll the outstanding request, delivering a completed payload into
    /// `dest`. `dest` must be at least as long as the requested byte count.
    fn poll_read(&mut self, dest: &mut [u8]) -> ReadPoll;
}
