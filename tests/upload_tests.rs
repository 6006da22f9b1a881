// Integration tests for the upload pipeline
//
// These tests verify non-overwriting object paths, the single MIME-type
// fallback to a generic binary content type, and the time-limited
// retrieval handles minted after upload.

use anyhow::Result;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use voclaria_live::{
    CaptureArtifact, MediaKind, MemoryBackend, MemoryBackendConfig, UploadError, UploadPipeline,
    AVATAR_TTL, RECORDING_TTL,
};

fn artifact(dir: &TempDir, name: &str, mime: &str) -> Result<CaptureArtifact> {
    let path = dir.path().join(name);
    fs::write(&path, b"recorded bytes")?;
    Ok(CaptureArtifact {
        local_path: path,
        media_kind: MediaKind::Video,
        duration_secs: 30,
        mime_type: mime.to_string(),
    })
}

fn pipeline(backend: &MemoryBackend) -> UploadPipeline {
    UploadPipeline::new(Arc::new(backend.clone()), "recordings")
}

#[tokio::test]
async fn upload_stores_object_and_mints_url() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = MemoryBackend::new(MemoryBackendConfig::default());
    let artifact = artifact(&dir, "take.mp4", "video/mp4")?;

    let handle = pipeline(&backend).upload(&artifact, RECORDING_TTL).await?;

    assert!(handle.object_path.starts_with("recordings/video-"));
    assert!(handle.object_path.ends_with(".mp4"));
    assert!(handle.retrieval_url.contains(&handle.object_path));

    let stored = backend.object(&handle.object_path).expect("object stored");
    assert_eq!(stored.bytes, b"recorded bytes");
    assert_eq!(stored.content_type, "video/mp4");

    // TTL of a week, give or take test slack.
    let remaining = handle.expires_at - Utc::now();
    assert!(remaining > chrono::Duration::days(6));
    assert!(remaining <= chrono::Duration::days(7));
    Ok(())
}

#[tokio::test]
async fn avatar_class_assets_get_short_lived_urls() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = MemoryBackend::new(MemoryBackendConfig::default());
    let artifact = artifact(&dir, "portrait.mp4", "video/mp4")?;

    let pipeline = UploadPipeline::new(Arc::new(backend.clone()), "avatars");
    let handle = pipeline.upload(&artifact, AVATAR_TTL).await?;

    assert!(handle.object_path.starts_with("avatars/"));
    let remaining = handle.expires_at - Utc::now();
    assert!(remaining > chrono::Duration::minutes(59), "roughly an hour remains");
    assert!(remaining <= chrono::Duration::hours(1), "never longer than the avatar TTL");
    Ok(())
}

#[tokio::test]
async fn rejected_mime_falls_back_to_generic_binary_once() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = MemoryBackend::new(MemoryBackendConfig::default());
    backend.reject_content_type("video/mp4");
    let artifact = artifact(&dir, "take.mp4", "video/mp4")?;

    let handle = pipeline(&backend).upload(&artifact, RECORDING_TTL).await?;

    let stored = backend.object(&handle.object_path).expect("object stored");
    assert_eq!(stored.content_type, "application/octet-stream", "fallback content type used");
    Ok(())
}

#[tokio::test]
async fn fallback_is_not_retried_further() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = MemoryBackend::new(MemoryBackendConfig::default());
    backend.reject_content_type("video/mp4");
    backend.reject_content_type("application/octet-stream");
    let artifact = artifact(&dir, "take.mp4", "video/mp4")?;

    let err = pipeline(&backend)
        .upload(&artifact, RECORDING_TTL)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::RejectedMime(_)), "exactly one fallback attempt: {err}");
    Ok(())
}

#[tokio::test]
async fn repeat_uploads_never_collide() -> Result<()> {
    let dir = TempDir::new()?;
    let backend = MemoryBackend::new(MemoryBackendConfig::default());
    let artifact = artifact(&dir, "take.mp4", "video/mp4")?;
    let pipeline = pipeline(&backend);

    let first = pipeline.upload(&artifact, RECORDING_TTL).await?;
    let second = pipeline.upload(&artifact, RECORDING_TTL).await?;

    assert_ne!(first.object_path, second.object_path, "every upload gets a fresh path");
    assert!(backend.object(&first.object_path).is_some());
    assert!(backend.object(&second.object_path).is_some());
    Ok(())
}

#[tokio::test]
async fn missing_artifact_file_is_reported() -> Result<()> {
    let backend = MemoryBackend::new(MemoryBackendConfig::default());
    let artifact = CaptureArtifact {
        local_path: PathBuf::from("/nonexistent/take.mp4"),
        media_kind: MediaKind::Video,
        duration_secs: 0,
        mime_type: "video/mp4".to_string(),
    };

    let err = pipeline(&backend)
        .upload(&artifact, Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Artifact(_)));
    Ok(())
}
