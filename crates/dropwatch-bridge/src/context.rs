//! Everything a handler needs, built once at startup and cloned into tasks.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use dropwatch_media::MediaDownloader;
use dropwatch_shared::{DropMatcher, PipelineConfig};
use dropwatch_sheets::SheetSynchronizer;
use dropwatch_store::Database;

use crate::error::{BridgeError, Result};
use crate::transport::ChatTransport;

#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub matcher: DropMatcher,
    pub db: Arc<Mutex<Database>>,
    pub transport: Arc<dyn ChatTransport>,
    pub sheets: Arc<SheetSynchronizer>,
    pub media: Arc<MediaDownloader>,
}

impl PipelineContext {
    pub fn new(
        config: Arc<PipelineConfig>,
        db: Arc<Mutex<Database>>,
        transport: Arc<dyn ChatTransport>,
        sheets: Arc<SheetSynchronizer>,
        media: Arc<MediaDownloader>,
    ) -> Result<Self> {
        let matcher = config
            .matcher()
            .map_err(|e| BridgeError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            config,
            matcher,
            db,
            transport,
            sheets,
            media,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.config.remote_timeout()
    }

    /// Run a store operation on the blocking pool under the remote-call
    /// budget. A timeout abandons the wait, not the statement.
    pub async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> dropwatch_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut guard = db.lock().map_err(|_| BridgeError::LockPoisoned)?;
            f(&mut guard).map_err(BridgeError::from)
        });

        let timeout = self.timeout();
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(BridgeError::Task(e.to_string())),
            Err(_) => Err(BridgeError::Timeout(timeout)),
        }
    }

    /// Calendar day a message counts towards, in the configured review
    /// timezone.
    pub fn review_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.config.review_offset()).date_naive()
    }

    /// Bounded-length submitter label derived from a sender id.
    pub fn submitter_label(&self, sender: &str) -> String {
        sender.chars().take(self.config.submitter_max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[tokio::test]
    async fn store_call_gives_up_after_timeout() {
        let (ctx, _env) =
            test_context_with_timeouts(RecordingTransport::default(), 1, Duration::from_secs(5));

        {
            let _held = ctx.db.lock().unwrap();
            let err = ctx.with_db(|db| db.list_chats()).await.unwrap_err();
            assert!(matches!(err, BridgeError::Timeout(_)));
        }

        let chats = ctx.with_db(|db| db.list_chats()).await.unwrap();
        assert!(chats.is_empty());
    }
}
