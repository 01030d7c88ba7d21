//! # dropwatch-store
//!
//! Embedded SQLite storage for the drop pipeline.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection` with typed helpers for chats, raw messages and QA
//! review records. Callers in async code wrap it in a mutex and reach it via
//! `spawn_blocking`.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod reviews;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
