use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    /// The descriptor lacks a field the download cannot do without.
    #[error("Incomplete media descriptor, missing: {}", .missing.join(", "))]
    IncompleteDescriptor { missing: Vec<&'static str> },

    /// The protocol client failed to download or decrypt.
    #[error("Media fetch failed: {0}")]
    Fetch(String),

    #[error("Media fetch timed out after {0:?}")]
    Timeout(Duration),

    /// Downloaded bytes do not match the descriptor.
    #[error("Media integrity check failed: {0}")]
    Integrity(String),

    /// Resolved cache path would leave the media directory.
    #[error("Invalid media path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn is_transient(&self) -> bool {
        matches!(self, MediaError::Timeout(_) | MediaError::Fetch(_))
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
