//! # dropwatch-sheets
//!
//! Spreadsheet mirror of the review lifecycle.
//!
//! - [`backend`]: the [`SheetsBackend`] seam and the [`CellRange`] addressing
//!   type
//! - [`google`]: Google Sheets v4 REST client
//! - [`memory`]: in-process backend with the same read semantics, used in
//!   tests
//! - [`allocator`]: first-free-row discovery
//! - [`sync`]: serialized new-row writes and resubmission flips

pub mod allocator;
pub mod backend;
pub mod google;
pub mod layout;
pub mod memory;
pub mod sync;

mod error;

pub use backend::{CellRange, Row, SheetsBackend};
pub use error::{Result, SheetError};
pub use google::GoogleSheets;
pub use layout::NewRow;
pub use memory::MemorySheets;
pub use sync::{ResubmitOutcome, SheetSynchronizer};
