//! # dropwatch-media
//!
//! Media attachments: descriptors are captured when a message arrives, bytes
//! are only fetched when someone asks for them.
//!
//! - [`descriptor`]: pull a [`MediaDescriptor`](dropwatch_shared::MediaDescriptor)
//!   out of a message payload
//! - [`download`]: the on-disk cache and the [`MediaFetcher`] seam to the
//!   protocol client that performs the actual download and decryption

pub mod descriptor;
pub mod download;

mod error;

pub use descriptor::extract_descriptor;
pub use download::{DownloadedMedia, MediaDownloader, MediaFetcher};
pub use error::{MediaError, Result};
