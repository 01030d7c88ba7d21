use std::time::Duration;

use thiserror::Error;

/// Errors produced by spreadsheet operations.
#[derive(Error, Debug)]
pub enum SheetError {
    /// The remote call did not finish inside its budget.
    #[error("Spreadsheet call timed out after {0:?}")]
    Timeout(Duration),

    /// Transport-level failure talking to the spreadsheet API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Spreadsheet API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Credentials were rejected.
    #[error("Spreadsheet authorization failed: {0}")]
    Auth(String),

    /// The named worksheet does not exist in the spreadsheet.
    #[error("Worksheet not found: {0}")]
    UnknownWorksheet(String),

    /// Every row up to the configured ceiling is populated.
    #[error("Worksheet {worksheet} has no free row up to {max_row}")]
    WorksheetFull { worksheet: String, max_row: u32 },

    /// Malformed response body.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl SheetError {
    /// Timeouts, connection failures, rate limiting and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            SheetError::Timeout(_) => true,
            SheetError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SheetError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SheetError>;
