//! Chat protocol events as delivered by the external protocol client.
//!
//! The client pushes these as tagged JSON (`{"type": "message", ...}`). Byte
//! fields (media keys and hashes) travel as standard base64.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ChatId;

/// Every event the dispatcher understands. Unknown `type` tags deserialize
/// to [`ChatEvent::Unknown`] so a newer client never breaks ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Message(InboundMessage),
    Receipt(Receipt),
    HistorySync(HistorySync),
    Connecting,
    Connected,
    Disconnected,
    LoggedOut,
    #[serde(other)]
    Unknown,
}

impl ChatEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Receipt(_) => "receipt",
            Self::HistorySync(_) => "history_sync",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::LoggedOut => "logged_out",
            Self::Unknown => "unknown",
        }
    }
}

/// A live message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub chat: ChatId,
    /// Sender user part (no server suffix).
    pub sender: String,
    #[serde(default)]
    pub from_me: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: MessagePayload,
}

/// Message body. At most one media sub-payload is expected to be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagePayload {
    pub conversation: Option<String>,
    pub extended_text: Option<ExtendedText>,
    pub image: Option<MediaPayload>,
    pub video: Option<MediaPayload>,
    pub audio: Option<MediaPayload>,
    pub document: Option<MediaPayload>,
}

impl MessagePayload {
    /// Plain text of the message, preferring the simple conversation field.
    pub fn text(&self) -> Option<&str> {
        if let Some(text) = self.conversation.as_deref().filter(|t| !t.is_empty()) {
            return Some(text);
        }
        self.extended_text
            .as_ref()
            .map(|e| e.text.as_str())
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedText {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaPayload {
    pub url: Option<String>,
    #[serde(with = "b64")]
    pub media_key: Option<Vec<u8>>,
    #[serde(with = "b64")]
    pub file_sha256: Option<Vec<u8>>,
    #[serde(with = "b64")]
    pub file_enc_sha256: Option<Vec<u8>>,
    pub file_length: Option<u64>,
    pub file_name: Option<String>,
    pub mimetype: Option<String>,
    pub caption: Option<String>,
}

/// Delivery/read confirmation. Carries no content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub chat: ChatId,
    #[serde(default)]
    pub message_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Bulk history replay sent by the server after pairing or on request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySync {
    pub conversations: Vec<Conversation>,
    pub pushnames: Vec<Pushname>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Conversation {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub name: Option<String>,
    /// Newest first, as the server sends them.
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryMessage {
    pub key: Option<MessageKey>,
    /// Unix seconds.
    pub timestamp: Option<i64>,
    pub message: Option<MessagePayload>,
}

impl HistoryMessage {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .filter(|ts| *ts != 0)
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageKey {
    pub id: Option<String>,
    pub from_me: Option<bool>,
    pub participant: Option<String>,
}

/// Contact push name shipped alongside history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pushname {
    pub id: String,
    pub pushname: Option<String>,
}

/// A historical record that may know a human-friendly name for its chat.
pub trait HasDisplayName {
    fn display_name(&self) -> Option<&str>;
}

impl HasDisplayName for Conversation {
    fn display_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| self.name.as_deref().filter(|n| !n.is_empty()))
    }
}

impl HasDisplayName for Pushname {
    fn display_name(&self) -> Option<&str> {
        self.pushname.as_deref().filter(|n| !n.is_empty())
    }
}

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| STANDARD.decode(s.as_bytes()))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_message() {
        let json = r#"{
            "type": "message",
            "id": "3EB0A1",
            "chat": "120363421664266245@g.us",
            "sender": "27640000000",
            "timestamp": "2026-03-01T08:30:00Z",
            "message": {
                "image": {"url": "https://mmg.example.net/v/t62/abc.enc?x=1", "media_key": "AQID", "file_length": 42}
            }
        }"#;

        let event: ChatEvent = serde_json::from_str(json).unwrap();
        let ChatEvent::Message(msg) = event else {
            panic!("expected message event");
        };
        assert!(!msg.from_me);
        assert!(msg.message.text().is_none());
        let image = msg.message.image.unwrap();
        assert_eq!(image.media_key, Some(vec![1, 2, 3]));
        assert_eq!(image.file_length, Some(42));
    }

    #[test]
    fn unknown_event_type_is_tolerated() {
        let event: ChatEvent =
            serde_json::from_str(r#"{"type": "presence", "who": "x"}"#).unwrap();
        assert_eq!(event.kind(), "unknown");
    }

    #[test]
    fn text_prefers_conversation() {
        let payload = MessagePayload {
            conversation: Some(String::new()),
            extended_text: Some(ExtendedText {
                text: "DR1 done".into(),
            }),
            ..Default::default()
        };
        assert_eq!(payload.text(), Some("DR1 done"));
    }

    #[test]
    fn conversation_display_name_falls_back_to_name() {
        let conv = Conversation {
            display_name: Some(String::new()),
            name: Some("Velo Test".into()),
            ..Default::default()
        };
        assert_eq!(conv.display_name(), Some("Velo Test"));
    }

    #[test]
    fn zero_history_timestamp_is_absent() {
        let msg = HistoryMessage {
            timestamp: Some(0),
            ..Default::default()
        };
        assert!(msg.timestamp().is_none());
    }
}
