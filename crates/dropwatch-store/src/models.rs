//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` so it can be handed directly to the HTTP
//! layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use dropwatch_shared::constants::{REVIEW_STEP_COUNT, STEP_NAMES};
use dropwatch_shared::{ChatId, MediaDescriptor};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A chat channel seen on the wire.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Chat {
    /// Protocol address of the chat.
    pub chat_id: ChatId,
    /// Display name (empty until resolved).
    pub name: String,
    /// Timestamp of the newest message observed for this chat.
    pub last_message_at: DateTime<Utc>,
    /// Project tag. `None` means the chat is stored only for referential
    /// integrity and is never processed.
    pub project_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A raw chat message, keyed by `(id, chat_id)`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub chat_id: ChatId,
    pub sender: String,
    /// Text body; `None` for media-only messages.
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Sent by the bridge's own account.
    pub from_me: bool,
    #[serde(skip)]
    pub media: Option<MediaDescriptor>,
}

impl StoredMessage {
    /// Messages with neither text nor media are never persisted.
    pub fn is_storable(&self) -> bool {
        self.content.as_deref().map_or(false, |c| !c.is_empty()) || self.media.is_some()
    }
}

// ---------------------------------------------------------------------------
// Review
// ---------------------------------------------------------------------------

/// Input for [`Database::upsert_review`](crate::Database::upsert_review).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReview {
    pub drop_number: String,
    pub review_date: NaiveDate,
    pub project: String,
    pub submitter: String,
}

/// What an upsert did to the `(drop_number, review_date)` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewUpsert {
    Created,
    Reopened,
}

/// QA photo review for one drop number on one day.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReviewRecord {
    pub id: i64,
    pub drop_number: String,
    pub review_date: NaiveDate,
    pub project: String,
    pub submitter: String,
    pub steps: [bool; REVIEW_STEP_COUNT],
    pub incomplete: bool,
    pub feedback_sent: Option<DateTime<Utc>>,
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewRecord {
    /// Names of the steps QA has not ticked yet.
    pub fn missing_steps(&self) -> Vec<&'static str> {
        self.steps
            .iter()
            .zip(STEP_NAMES.iter())
            .filter(|(done, _)| !**done)
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.iter().filter(|s| **s).count()
    }
}
