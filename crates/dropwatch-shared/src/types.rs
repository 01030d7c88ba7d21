use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::GROUP_SERVER;

// Chat address, e.g. "120363421664266245@g.us" or "27640000000@s.whatsapp.net"
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl ChatId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `@`, or the whole address if there is no server part.
    pub fn user(&self) -> &str {
        self.0.split_once('@').map(|(u, _)| u).unwrap_or(&self.0)
    }

    pub fn server(&self) -> &str {
        self.0.split_once('@').map(|(_, s)| s).unwrap_or("")
    }

    pub fn is_group(&self) -> bool {
        self.server() == GROUP_SERVER
    }

    /// Directory-safe form of the address, used for the media cache layout.
    pub fn to_path_component(&self) -> String {
        self.0.replace(':', "_")
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChatId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }

    /// Extension used when the sender did not provide a file name.
    pub fn default_extension(&self) -> Option<&'static str> {
        match self {
            Self::Image => Some("jpg"),
            Self::Video => Some("mp4"),
            Self::Audio => Some("ogg"),
            Self::Document => None,
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            other => Err(format!("unsupported media type: {other}")),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to fetch and decrypt a media attachment later, captured
/// at ingestion time without downloading any bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    pub filename: String,
    pub url: Option<String>,
    pub media_key: Option<Vec<u8>>,
    pub file_sha256: Option<Vec<u8>>,
    pub file_enc_sha256: Option<Vec<u8>>,
    pub file_length: Option<u64>,
}

impl MediaDescriptor {
    /// Names of the fields a download cannot proceed without.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.url.as_deref().map_or(true, str::is_empty) {
            missing.push("url");
        }
        if self.media_key.as_ref().map_or(true, Vec::is_empty) {
            missing.push("media_key");
        }
        if self.file_sha256.as_ref().map_or(true, Vec::is_empty) {
            missing.push("file_sha256");
        }
        if self.file_enc_sha256.as_ref().map_or(true, Vec::is_empty) {
            missing.push("file_enc_sha256");
        }
        if self.file_length.map_or(true, |n| n == 0) {
            missing.push("file_length");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// Lifecycle of the chat protocol session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    LoggedOut,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::LoggedOut => "logged_out",
        }
    }
}
