//! Seam to the external chat protocol client.
//!
//! The protocol client owns the session (pairing, encryption, reconnects).
//! The pipeline only needs a few narrow capabilities from it: name lookups,
//! sending, and fetching decrypted media bytes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use dropwatch_media::{MediaError, MediaFetcher};
use dropwatch_shared::{ChatId, MediaDescriptor};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The protocol client answered but refused the request.
    #[error("Protocol client rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Protocol client unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Http(e) => e.is_timeout() || e.is_connect(),
            TransportError::Rejected { status, .. } => *status == 429 || *status >= 500,
            TransportError::Unavailable(_) => true,
        }
    }
}

/// Outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub recipient: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_path: Option<PathBuf>,
}

/// Result of a send as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    pub message: String,
}

impl SendOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Subject of a group chat, if the client knows it.
    async fn group_name(&self, chat: &ChatId) -> Result<Option<String>, TransportError>;

    /// Saved contact name for a one-to-one chat.
    async fn contact_name(&self, chat: &ChatId) -> Result<Option<String>, TransportError>;

    /// User part of the account the client is logged in as.
    fn own_user(&self) -> Option<String>;

    async fn send_message(&self, request: &SendRequest) -> Result<SendOutcome, TransportError>;

    /// Download and decrypt an attachment, returning plaintext bytes.
    async fn download_media(&self, descriptor: &MediaDescriptor) -> Result<Vec<u8>, TransportError>;
}

/// Lets the media downloader fetch through a [`ChatTransport`].
pub struct TransportFetcher(pub Arc<dyn ChatTransport>);

#[async_trait]
impl MediaFetcher for TransportFetcher {
    async fn fetch(&self, descriptor: &MediaDescriptor) -> dropwatch_media::Result<Vec<u8>> {
        self.0
            .download_media(descriptor)
            .await
            .map_err(|e| MediaError::Fetch(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Talks to a protocol client sidecar over its local HTTP API.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    own_user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NameResponse {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
struct MediaRequest<'a> {
    kind: &'a str,
    url: Option<&'a str>,
    media_key: Option<String>,
    file_sha256: Option<String>,
    file_enc_sha256: Option<String>,
    file_length: Option<u64>,
}

impl<'a> From<&'a MediaDescriptor> for MediaRequest<'a> {
    fn from(d: &'a MediaDescriptor) -> Self {
        let b64 = |v: &Option<Vec<u8>>| v.as_ref().map(|bytes| STANDARD.encode(bytes));
        Self {
            kind: d.kind.as_str(),
            url: d.url.as_deref(),
            media_key: b64(&d.media_key),
            file_sha256: b64(&d.file_sha256),
            file_enc_sha256: b64(&d.file_enc_sha256),
            file_length: d.file_length,
        }
    }
}

impl HttpTransport {
    pub fn new(client: Client, base_url: impl Into<String>, own_user: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            own_user,
        }
    }

    async fn lookup_name(&self, kind: &str, chat: &ChatId) -> Result<Option<String>, TransportError> {
        let url = format!("{}/api/{kind}/{}", self.base_url, chat.as_str());
        let resp = self.client.get(url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp).await?;
        let body: NameResponse = resp.json().await?;
        Ok(body.name.filter(|n| !n.is_empty()))
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(TransportError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn group_name(&self, chat: &ChatId) -> Result<Option<String>, TransportError> {
        self.lookup_name("groups", chat).await
    }

    async fn contact_name(&self, chat: &ChatId) -> Result<Option<String>, TransportError> {
        self.lookup_name("contacts", chat).await
    }

    fn own_user(&self) -> Option<String> {
        self.own_user.clone()
    }

    async fn send_message(&self, request: &SendRequest) -> Result<SendOutcome, TransportError> {
        let url = format!("{}/api/send", self.base_url);
        let resp = self.client.post(url).json(request).send().await?;

        // The client reports refusals in the body with success=false.
        if resp.status().is_client_error() {
            let outcome: SendOutcome = resp.json().await?;
            return Ok(outcome);
        }
        let outcome: SendOutcome = check(resp).await?.json().await?;
        debug!(recipient = %request.recipient, success = outcome.success, "send forwarded");
        Ok(outcome)
    }

    async fn download_media(&self, descriptor: &MediaDescriptor) -> Result<Vec<u8>, TransportError> {
        let url = format!("{}/api/media", self.base_url);
        let resp = self
            .client
            .post(url)
            .json(&MediaRequest::from(descriptor))
            .send()
            .await?;
        let bytes = check(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
