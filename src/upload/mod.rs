//! Capture-artifact upload pipeline
//!
//! Negotiates an object path and content type for a finished artifact,
//! uploads it durably (never overwriting), and mints a time-limited
//! retrieval handle. If the backend rejects the declared MIME type
//! specifically, the pipeline retries exactly once with a generic binary
//! content type — a documented, bounded fallback, not a retry loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::capture::{CaptureArtifact, MediaKind};
use crate::error::{ObjectStoreError, UploadError};

/// Fixed TTL for finished recordings. Caller-supplied to `upload`; the
/// pipeline itself hardcodes nothing.
pub const RECORDING_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Fixed TTL for avatar-class assets.
pub const AVATAR_TTL: Duration = Duration::from_secs(60 * 60);

const GENERIC_BINARY: &str = "application/octet-stream";

/// A durable, time-limited retrieval handle for one uploaded artifact.
#[derive(Debug, Clone)]
pub struct UploadHandle {
    pub object_path: String,
    pub retrieval_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Object store seam: upload-with-content-type, duplicate-path refusal,
/// and time-limited signed retrieval URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, ObjectStoreError>;
}

/// Uploads finished artifacts and mints retrieval handles.
pub struct UploadPipeline {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    sequence: AtomicU64,
}

impl UploadPipeline {
    /// `prefix` namespaces object paths (e.g. "recordings").
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Upload an artifact and return a retrieval handle valid for `ttl`.
    ///
    /// Every call mints a fresh object path (timestamp plus a process-wide
    /// sequence), so re-uploading the same artifact can never clobber an
    /// earlier object.
    pub async fn upload(
        &self,
        artifact: &CaptureArtifact,
        ttl: Duration,
    ) -> Result<UploadHandle, UploadError> {
        let bytes = tokio::fs::read(&artifact.local_path).await?;

        let content_type = declared_content_type(artifact);
        let path = self.object_path(artifact);

        info!(
            "Uploading {} ({} bytes) as {}",
            path,
            bytes.len(),
            content_type
        );

        match self.store.put(&path, &bytes, &content_type).await {
            Ok(()) => {}
            Err(ObjectStoreError::UnsupportedContentType(rejected)) => {
                // Bounded fallback: one retry with the generic binary type.
                warn!(
                    "Backend rejected content type {}, retrying once as {}",
                    rejected, GENERIC_BINARY
                );
                self.store
                    .put(&path, &bytes, GENERIC_BINARY)
                    .await
                    .map_err(map_store_error)?;
            }
            Err(e) => return Err(map_store_error(e)),
        }

        let retrieval_url = self
            .store
            .signed_url(&path, ttl)
            .await
            .map_err(map_store_error)?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

        info!("Upload complete: {}", path);

        Ok(UploadHandle {
            object_path: path,
            retrieval_url,
            expires_at,
        })
    }

    fn object_path(&self, artifact: &CaptureArtifact) -> String {
        let kind = match artifact.media_kind {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        };
        let extension = artifact
            .local_path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin");
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        format!(
            "{}/{}-{}-{:04}.{}",
            self.prefix,
            kind,
            Utc::now().timestamp_millis(),
            sequence,
            extension
        )
    }
}

/// Content type negotiation: the artifact's declared MIME type wins,
/// otherwise derive from the container extension, otherwise fall back to
/// the media kind's default.
fn declared_content_type(artifact: &CaptureArtifact) -> String {
    if !artifact.mime_type.is_empty() {
        return artifact.mime_type.clone();
    }

    let extension = artifact
        .local_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let derived = match extension.as_deref() {
        Some("mp4") => match artifact.media_kind {
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => "audio/mp4",
        },
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("m4a") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        _ => artifact.media_kind.default_mime(),
    };
    derived.to_string()
}

fn map_store_error(error: ObjectStoreError) -> UploadError {
    match error {
        ObjectStoreError::Network => UploadError::Network,
        ObjectStoreError::UnsupportedContentType(mime) => UploadError::RejectedMime(mime),
        other => UploadError::Server(other.to_string()),
    }
}
