//! Error types.

use thiserror::Error;

use crate::session::StreamState;

/// Error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Container rejected at load: bad magic, unsupported geometry, or a
    /// truncated header. No session state is mutated before this check.
    #[error("format error: {0}")]
    Format(String),

    /// Configuration that cannot drive the stream (e.g. a buffer too small
    /// to hold two chunks).
    #[error("config error: {0}")]
    Config(String),

    /// Storage collaborator failure while locating a file or issuing a read.
    ///
    /// Mid-stream read failures are *not* surfaced this way: the scheduler
    /// discards the pending data and retries on the next poll.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation called in a state that cannot honor it.
    #[error("{op} not valid while {state:?}")]
    InvalidState {
        op: &'static str,
        state: StreamState,
    },

    /// The bounded priming loop inside `load` exhausted its poll budget
    /// without the storage medium ever settling.
    #[error("priming stalled: storage never completed during load")]
    PrimingStalled,
}

/// Failure reported by a [`StorageSource`](crate::StorageSource).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No file at the given path.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The medium reported a read error.
    #[error("medium read error")]
    Medium,

    /// A request was issued while another was still outstanding.
    #[error("a read request is already outstanding")]
    Outstanding,
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
