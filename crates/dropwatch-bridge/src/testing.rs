//! Test doubles shared by the bridge unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use dropwatch_media::MediaDownloader;
use dropwatch_shared::protocol::{InboundMessage, MessagePayload};
use dropwatch_shared::{ChatId, MediaDescriptor, PipelineConfig};
use dropwatch_sheets::{MemorySheets, SheetSynchronizer};
use dropwatch_store::Database;

use crate::context::PipelineContext;
use crate::transport::{ChatTransport, SendOutcome, SendRequest, TransportError, TransportFetcher};

pub const VELO_CHAT: &str = "120363421664266245@g.us";
pub const LAWLEY_CHAT: &str = "120363418298130331@g.us";
pub const VELO_TAB: &str = "Velo Test";

#[derive(Default)]
pub struct RecordingTransport {
    groups: HashMap<String, String>,
    contacts: HashMap<String, String>,
    own_user: Option<String>,
    media: Vec<u8>,
    fail_sends: bool,
    sent: Mutex<Vec<SendRequest>>,
}

impl RecordingTransport {
    pub fn with_group(mut self, chat: &str, name: &str) -> Self {
        self.groups.insert(chat.to_string(), name.to_string());
        self
    }

    pub fn with_contact(mut self, chat: &str, name: &str) -> Self {
        self.contacts.insert(chat.to_string(), name.to_string());
        self
    }

    pub fn with_own_user(mut self, user: &str) -> Self {
        self.own_user = Some(user.to_string());
        self
    }

    pub fn with_media(mut self, bytes: &[u8]) -> Self {
        self.media = bytes.to_vec();
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn group_name(&self, chat: &ChatId) -> Result<Option<String>, TransportError> {
        Ok(self.groups.get(chat.as_str()).cloned())
    }

    async fn contact_name(&self, chat: &ChatId) -> Result<Option<String>, TransportError> {
        Ok(self.contacts.get(chat.as_str()).cloned())
    }

    fn own_user(&self) -> Option<String> {
        self.own_user.clone()
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendOutcome, TransportError> {
        if self.fail_sends {
            return Err(TransportError::Unavailable("not connected".into()));
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(SendOutcome::ok(format!("Message sent to {}", request.recipient)))
    }

    async fn download_media(&self, _descriptor: &MediaDescriptor) -> Result<Vec<u8>, TransportError> {
        Ok(self.media.clone())
    }
}

pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub sheets: Arc<MemorySheets>,
    pub transport: Arc<RecordingTransport>,
}

pub fn test_context(transport: RecordingTransport) -> (PipelineContext, TestEnv) {
    test_context_with_timeouts(transport, 5, Duration::from_secs(5))
}

/// `store_secs` bounds store calls; `sheet_timeout` bounds each sheet call.
pub fn test_context_with_timeouts(
    transport: RecordingTransport,
    store_secs: u64,
    sheet_timeout: Duration,
) -> (PipelineContext, TestEnv) {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(PipelineConfig {
        remote_timeout_secs: store_secs,
        ..PipelineConfig::default()
    });

    let db = Database::open_at(&dir.path().join("pipeline.db")).unwrap();

    let sheets = Arc::new(MemorySheets::new());
    for project in &config.projects {
        sheets.add_worksheet(&project.worksheet);
    }
    let sync = SheetSynchronizer::new(sheets.clone(), config.sheet.clone(), sheet_timeout);

    let transport = Arc::new(transport);
    let media = MediaDownloader::new(
        dir.path().join("media"),
        Arc::new(TransportFetcher(transport.clone())),
        Duration::from_secs(5),
    );

    let ctx = PipelineContext::new(
        config,
        Arc::new(Mutex::new(db)),
        transport.clone(),
        Arc::new(sync),
        Arc::new(media),
    )
    .unwrap();

    (
        ctx,
        TestEnv {
            dir,
            sheets,
            transport,
        },
    )
}

pub fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, min, 0).unwrap()
}

pub fn text_message(id: &str, chat: &str, sender: &str, text: &str, ts: DateTime<Utc>) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        chat: ChatId::new(chat),
        sender: sender.to_string(),
        from_me: false,
        timestamp: ts,
        message: MessagePayload {
            conversation: Some(text.to_string()),
            ..Default::default()
        },
    }
}
