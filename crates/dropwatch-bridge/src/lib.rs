//! # dropwatch-bridge
//!
//! The message-to-lifecycle pipeline: chat events come in on a channel, raw
//! messages land in the store, drop numbers drive the review lifecycle and
//! the spreadsheet mirror.
//!
//! - [`dispatcher`]: the event loop, one handler per [`ChatEvent`] variant
//! - [`drops`]: drop-number processing for a single message
//! - [`lifecycle`]: create-or-reopen against the review store plus the
//!   matching sheet write
//! - [`names`]: chat display-name resolution
//! - [`actions`]: outbound send and on-demand media download
//! - [`feedback`]: QA feedback for incomplete reviews
//! - [`transport`]: the seam to the external protocol client
//!
//! [`ChatEvent`]: dropwatch_shared::ChatEvent

pub mod actions;
pub mod context;
pub mod dispatcher;
pub mod drops;
pub mod feedback;
pub mod lifecycle;
pub mod names;
pub mod transport;

mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use context::PipelineContext;
pub use dispatcher::spawn_dispatcher;
pub use error::{BridgeError, Result};
pub use transport::{ChatTransport, HttpTransport, SendOutcome, SendRequest, TransportError};
