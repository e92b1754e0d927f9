//! The media pipeline: provider-hosted attachment in, canonical stored
//! reference out.
//!
//! Ingestion never fails the surrounding webhook: every error path collapses
//! to `None` and the caller substitutes a placeholder message. Transcoding
//! work is bounded by a semaphore sized independently of request concurrency.

use std::{sync::Arc, time::Duration};

use {
    tokio::sync::Semaphore,
    tracing::{debug, warn},
    uuid::Uuid,
};

use {
    courier_channels::DownloadRequest,
    courier_common::MediaKind,
};

use crate::{
    download::fetch_limited,
    error::{Error, Result},
    image_ops, mime,
    store::{ObjectStore, object_key},
};

/// Size/time/quality limits, normally sourced from the media config section.
#[derive(Debug, Clone)]
pub struct MediaLimits {
    pub max_bytes: u64,
    pub max_image_width: u32,
    pub jpeg_quality: u8,
    pub download_timeout: Duration,
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self {
            max_bytes: 20 * 1024 * 1024,
            max_image_width: 1280,
            jpeg_quality: 80,
            download_timeout: Duration::from_secs(30),
        }
    }
}

/// Extra metadata accompanying a provider attachment.
#[derive(Debug, Clone, Default)]
pub struct IngestMeta {
    pub file_name: Option<String>,
    pub caption: Option<String>,
    pub mime_type: Option<String>,
}

/// A processed, persisted attachment.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredMedia {
    pub storage_key: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub original_name: String,
    pub caption: Option<String>,
}

/// Downloads, normalizes, and stores attachments.
pub struct MediaPipeline {
    client: reqwest::Client,
    store: Arc<dyn ObjectStore>,
    limits: MediaLimits,
    permits: Arc<Semaphore>,
}

impl MediaPipeline {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, limits: MediaLimits, concurrency: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            store,
            limits,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.limits.max_bytes
    }

    #[must_use]
    pub fn object_store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    /// Ingest a provider-hosted attachment. Returns `None` on any failure;
    /// the caller falls back to a placeholder message instead of dropping
    /// the whole ingestion.
    pub async fn ingest(
        &self,
        request: DownloadRequest,
        kind: MediaKind,
        meta: IngestMeta,
    ) -> Option<StoredMedia> {
        let _permit = self.permits.acquire().await.ok()?;
        match self.ingest_inner(&request, kind, meta).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(%kind, error = %e, "media ingestion failed");
                None
            },
        }
    }

    async fn ingest_inner(
        &self,
        request: &DownloadRequest,
        kind: MediaKind,
        meta: IngestMeta,
    ) -> Result<StoredMedia> {
        let downloaded = fetch_limited(
            &self.client,
            request,
            self.limits.download_timeout,
            self.limits.max_bytes,
        )
        .await?;

        let url_name = url_basename(&request.url);
        let mut bytes = downloaded.bytes;
        let mut mime_type = meta
            .mime_type
            .clone()
            .or(downloaded
                .content_type
                .filter(|c| c != "application/octet-stream"))
            .or_else(|| url_name.as_deref().and_then(mime::mime_for_path).map(Into::into))
            .unwrap_or_else(|| "application/octet-stream".to_string());

        (bytes, mime_type) = self.normalize(bytes, mime_type, kind);

        let ext = mime::extension_for_mime(&mime_type).unwrap_or(kind.fallback_ext());
        let original_name = meta
            .file_name
            .clone()
            .or(url_name)
            .unwrap_or_else(|| format!("{}.{ext}", Uuid::new_v4()));

        let storage_key = object_key(&original_name);
        let byte_size = bytes.len() as u64;
        self.store.put(&storage_key, bytes, &mime_type).await?;

        debug!(%kind, %storage_key, byte_size, "media stored");
        Ok(StoredMedia {
            storage_key,
            mime_type,
            byte_size,
            original_name,
            caption: meta.caption,
        })
    }

    /// Store an operator-supplied outbound attachment. The size cap is
    /// checked before anything else so an oversized upload is rejected
    /// without touching the network or the object store.
    pub async fn store_outbound(
        &self,
        bytes: Vec<u8>,
        original_name: &str,
        mime_type: &str,
    ) -> Result<StoredMedia> {
        if bytes.len() as u64 > self.limits.max_bytes {
            return Err(Error::TooLarge {
                limit: self.limits.max_bytes,
            });
        }

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::external("media semaphore", e))?;

        let kind = kind_for_mime(mime_type);
        let (bytes, mime_type) = self.normalize(bytes, mime_type.to_string(), kind);

        let storage_key = object_key(original_name);
        let byte_size = bytes.len() as u64;
        self.store.put(&storage_key, bytes, &mime_type).await?;

        Ok(StoredMedia {
            storage_key,
            mime_type,
            byte_size,
            original_name: original_name.to_string(),
            caption: None,
        })
    }

    /// Apply the per-kind normalization rules. Decode failures keep the
    /// original bytes — a corrupt image is still worth storing.
    fn normalize(&self, bytes: Vec<u8>, mime_type: String, kind: MediaKind) -> (Vec<u8>, String) {
        match kind {
            MediaKind::Image if !mime_type.contains("webp") => {
                match image_ops::clamp_width(
                    &bytes,
                    self.limits.max_image_width,
                    self.limits.jpeg_quality,
                ) {
                    Ok(Some(re)) => {
                        debug!(width = re.width, "image downscaled");
                        (re.data, re.mime_type.to_string())
                    },
                    Ok(None) => (bytes, mime_type),
                    Err(e) => {
                        warn!(error = %e, "image optimization skipped");
                        (bytes, mime_type)
                    },
                }
            },
            MediaKind::Sticker => match image_ops::to_png(&bytes) {
                Ok(png) => (png, "image/png".to_string()),
                Err(e) => {
                    warn!(error = %e, "sticker conversion skipped");
                    (bytes, mime_type)
                },
            },
            // Voice notes get one canonical MIME type regardless of source.
            MediaKind::Voice => (bytes, "audio/ogg".to_string()),
            _ => (bytes, mime_type),
        }
    }
}

fn kind_for_mime(mime_type: &str) -> MediaKind {
    if mime_type.starts_with("image/") {
        MediaKind::Image
    } else if mime_type.starts_with("video/") {
        MediaKind::Video
    } else if mime_type.starts_with("audio/") {
        MediaKind::Audio
    } else {
        MediaKind::Document
    }
}

fn url_basename(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let name = path.rsplit('/').next()?;
    if name.is_empty() || name.contains(':') {
        None
    } else {
        Some(name.to_string())
    }
}
