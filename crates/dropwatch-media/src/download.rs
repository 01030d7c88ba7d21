//! On-demand media download with a deterministic on-disk cache.
//!
//! Files live at `<root>/<chat path component>/<filename>`. An existing file
//! is returned as is; otherwise the descriptor must be complete, the bytes
//! are fetched through a [`MediaFetcher`], checked against the descriptor's
//! plaintext hash and length, and written atomically.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, info};

use dropwatch_shared::{ChatId, MediaDescriptor, MediaKind};

use crate::error::{MediaError, Result};

/// Downloads and decrypts an attachment. Implemented by the protocol client
/// transport; the returned bytes are plaintext.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, descriptor: &MediaDescriptor) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub kind: MediaKind,
    pub filename: String,
    pub path: PathBuf,
    /// Served from the cache without fetching.
    pub cached: bool,
}

pub struct MediaDownloader {
    root: PathBuf,
    fetcher: Arc<dyn MediaFetcher>,
    timeout: Duration,
}

impl MediaDownloader {
    pub fn new(root: PathBuf, fetcher: Arc<dyn MediaFetcher>, timeout: Duration) -> Self {
        Self {
            root,
            fetcher,
            timeout,
        }
    }

    /// Deterministic cache location of an attachment.
    pub fn local_path(&self, chat: &ChatId, filename: &str) -> Result<PathBuf> {
        let relative = Path::new(&chat.to_path_component()).join(filename);
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(MediaError::InvalidPath(relative.display().to_string()));
            }
        }
        Ok(self.root.join(relative))
    }

    pub async fn download(&self, chat: &ChatId, descriptor: &MediaDescriptor) -> Result<DownloadedMedia> {
        let path = self.local_path(chat, &descriptor.filename)?;

        if fs::try_exists(&path).await? {
            debug!(path = %path.display(), "media already cached");
            return Ok(DownloadedMedia {
                kind: descriptor.kind,
                filename: descriptor.filename.clone(),
                path,
                cached: true,
            });
        }

        let missing = descriptor.missing_fields();
        if !missing.is_empty() {
            return Err(MediaError::IncompleteDescriptor { missing });
        }

        let bytes = tokio::time::timeout(self.timeout, self.fetcher.fetch(descriptor))
            .await
            .map_err(|_| MediaError::Timeout(self.timeout))??;

        verify(descriptor, &bytes)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension(format!("{}.part", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;

        info!(
            path = %path.display(),
            kind = %descriptor.kind,
            size = bytes.len(),
            "downloaded media"
        );

        Ok(DownloadedMedia {
            kind: descriptor.kind,
            filename: descriptor.filename.clone(),
            path,
            cached: false,
        })
    }
}

fn verify(descriptor: &MediaDescriptor, bytes: &[u8]) -> Result<()> {
    if let Some(expected) = descriptor.file_length {
        if bytes.len() as u64 != expected {
            return Err(MediaError::Integrity(format!(
                "expected {expected} bytes, got {}",
                bytes.len()
            )));
        }
    }

    if let Some(expected) = descriptor.file_sha256.as_deref() {
        let actual = Sha256::digest(bytes);
        if actual.as_slice() != expected {
            return Err(MediaError::Integrity(format!(
                "sha256 mismatch: expected {}, got {}",
                hex::encode(expected),
                hex::encode(actual)
            )));
        }
    }

    Ok(())
}
