//! # dropwatch-shared
//!
//! Types shared by every dropwatch crate: chat protocol event shapes, the
//! drop-number matcher, the immutable pipeline configuration and a handful of
//! deployment constants.

pub mod config;
pub mod constants;
pub mod error;
pub mod pattern;
pub mod protocol;
pub mod types;

pub use config::{PipelineConfig, ProjectConfig, SheetLayout};
pub use error::ConfigError;
pub use pattern::DropMatcher;
pub use protocol::{ChatEvent, HasDisplayName};
pub use types::{ChatId, ConnectionState, MediaDescriptor, MediaKind};
