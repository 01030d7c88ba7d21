use std::time::Duration;

use thiserror::Error;

use dropwatch_media::MediaError;
use dropwatch_sheets::SheetError;
use dropwatch_store::StoreError;

use crate::transport::TransportError;

/// Errors surfaced by pipeline operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sheet error: {0}")]
    Sheet(#[from] SheetError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A store call did not finish inside the remote-call budget.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A blocking task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Feedback generation failed: {0}")]
    Feedback(String),
}

impl BridgeError {
    /// Failures worth retrying on a later event.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::Timeout(_) => true,
            BridgeError::Sheet(e) => e.is_transient(),
            BridgeError::Media(e) => e.is_transient(),
            BridgeError::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
