//! Operations triggered from outside the event stream: sending a message and
//! downloading a stored attachment.

use chrono::Utc;
use tracing::{info, warn};

use dropwatch_media::DownloadedMedia;
use dropwatch_shared::ChatId;

use crate::context::PipelineContext;
use crate::error::{BridgeError, Result};
use crate::transport::{SendOutcome, SendRequest};

/// Validate and forward an outbound message. Failures come back as an
/// unsuccessful outcome for the caller; nothing is posted to any chat.
pub async fn send_message(ctx: &PipelineContext, request: SendRequest) -> SendOutcome {
    if request.recipient.trim().is_empty() {
        return SendOutcome::failed("Recipient is required");
    }
    if request.message.is_empty() && request.media_path.is_none() {
        return SendOutcome::failed("Message or media path is required");
    }
    if let Some(path) = &request.media_path {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return SendOutcome::failed(format!("Media file not found: {}", path.display()));
        }
    }

    match ctx.transport.send_message(&request).await {
        Ok(outcome) => {
            info!(recipient = %request.recipient, success = outcome.success, "outbound message");
            outcome
        }
        Err(e) => {
            warn!(recipient = %request.recipient, error = %e, "send failed");
            SendOutcome::failed(format!("Error sending message: {e}"))
        }
    }
}

/// Download the attachment of a stored message into the media cache.
///
/// The descriptor is written back afterwards so a generated file name sticks
/// and the next request is served from the cache.
pub async fn download_media(
    ctx: &PipelineContext,
    message_id: &str,
    chat: &ChatId,
) -> Result<DownloadedMedia> {
    if message_id.is_empty() {
        return Err(BridgeError::InvalidRequest("message_id is required".into()));
    }

    let mut descriptor = {
        let id = message_id.to_string();
        let chat = chat.clone();
        ctx.with_db(move |db| db.get_media_descriptor(&id, &chat)).await?
    };

    if descriptor.filename.is_empty() {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        descriptor.filename = match descriptor.kind.default_extension() {
            Some(ext) => format!("{}_{stamp}.{ext}", descriptor.kind),
            None => format!("{}_{stamp}", descriptor.kind),
        };
    }

    let downloaded = ctx.media.download(chat, &descriptor).await?;

    let backfill = {
        let id = message_id.to_string();
        let chat = chat.clone();
        let descriptor = descriptor.clone();
        ctx.with_db(move |db| db.update_media_descriptor(&id, &chat, &descriptor))
            .await
    };
    if let Err(e) = backfill {
        warn!(id = message_id, chat = %chat, error = %e, "failed to persist media descriptor");
    }

    Ok(downloaded)
}
