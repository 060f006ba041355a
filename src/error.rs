// src/error.rs
//
// Error taxonomy for the sync engine and REST client.

use std::path::PathBuf;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the store client and the transfer pipelines.
///
/// Per-item failures (`TransferNotConfirmed`, `StreamInterrupted`,
/// `ArchiveCorrupt`) are normally absorbed into outcome values by the
/// pipelines; the remaining variants abort the operation that hit them.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("invalid path: {0} does not exist")]
    InvalidPath(PathBuf),

    #[error("store request failed with status {status}: {message}")]
    Store { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upload of {key} not confirmed (status {status})")]
    TransferNotConfirmed { key: String, status: u16 },

    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("archive corrupt: {0}")]
    ArchiveCorrupt(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("worker task failed: {0}")]
    Task(String),

    #[error("{0} already exists")]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// True for errors the archive fetcher treats as "category is empty".
    pub fn is_stream_interrupted(&self) -> bool {
        matches!(self, SyncError::StreamInterrupted(_))
    }
}
