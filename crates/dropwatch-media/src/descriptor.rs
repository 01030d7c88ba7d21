//! Descriptor extraction at ingestion time. Nothing is downloaded here.

use chrono::{DateTime, Utc};

use dropwatch_shared::protocol::{MediaPayload, MessagePayload};
use dropwatch_shared::{MediaDescriptor, MediaKind};

/// First media sub-payload of a message, in image, video, audio, document
/// order, as a descriptor. `None` for text-only messages.
pub fn extract_descriptor(payload: &MessagePayload, now: DateTime<Utc>) -> Option<MediaDescriptor> {
    let (kind, media) = [
        (MediaKind::Image, payload.image.as_ref()),
        (MediaKind::Video, payload.video.as_ref()),
        (MediaKind::Audio, payload.audio.as_ref()),
        (MediaKind::Document, payload.document.as_ref()),
    ]
    .into_iter()
    .find_map(|(kind, media)| media.map(|m| (kind, m)))?;

    Some(MediaDescriptor {
        kind,
        filename: media_filename(kind, media, now),
        url: media.url.clone().filter(|u| !u.is_empty()),
        media_key: media.media_key.clone(),
        file_sha256: media.file_sha256.clone(),
        file_enc_sha256: media.file_enc_sha256.clone(),
        file_length: media.file_length,
    })
}

/// `image_20260301_083000.jpg` style names; documents keep the sender's file
/// name when there is one.
fn media_filename(kind: MediaKind, media: &MediaPayload, now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");

    if kind == MediaKind::Document {
        if let Some(name) = media.file_name.as_deref().map(sanitize).filter(|n| !n.is_empty()) {
            return name;
        }
        return format!("document_{stamp}");
    }

    match kind.default_extension() {
        Some(ext) => format!("{}_{stamp}.{ext}", kind.as_str()),
        None => format!("{}_{stamp}", kind.as_str()),
    }
}

// Sender-supplied names must stay a single path component.
fn sanitize(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}
