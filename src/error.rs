use std::time::Duration;
use thiserror::Error;

/// Errors reported by the capture state machine.
///
/// Only `PermissionDenied` and the bind failures are meant to reach the user,
/// and only after the internal remount budget is exhausted.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Camera and/or microphone permission was denied. The capture never
    /// starts degraded; the caller should surface a settings prompt.
    #[error("camera/microphone permission denied")]
    PermissionDenied,

    /// The device never signaled ready within the bind window.
    #[error("capture device did not signal ready within {0:?}")]
    BindTimeout(Duration),

    /// The device reported a mount error while binding.
    #[error("capture device bind failed: {0}")]
    BindFailed(String),

    /// Hardware-layer failure outside the bind phase.
    #[error("capture device error: {0}")]
    Device(String),

    /// `stop()` was called with no recording in progress.
    #[error("no recording in progress")]
    NotRecording,
}

/// Terminal upload failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("network failure during upload")]
    Network,

    /// The backend rejected both the declared content type and the
    /// generic binary fallback.
    #[error("storage backend rejected content type {0}")]
    RejectedMime(String),

    #[error("storage backend error: {0}")]
    Server(String),

    /// The local artifact could not be read.
    #[error("could not read capture artifact: {0}")]
    Artifact(#[from] std::io::Error),
}

/// Realtime channel faults. Retried transparently with backoff; these never
/// bubble up to the UI once a subscription is established.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("realtime channel disconnected")]
    Disconnected,

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Row store faults. Reaction write failures are recovered via rollback;
/// attendance write failures are logged and swallowed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("conflicting write")]
    Conflict,

    #[error("row store backend failure: {0}")]
    Backend(String),
}

/// Object store faults as seen by the upload pipeline.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Uploads are non-overwriting; an existing path is refused.
    #[error("object path already exists")]
    DuplicatePath,

    /// The backend rejects this content type specifically. Distinguishable
    /// so the pipeline can fall back to a generic binary type exactly once.
    #[error("content type {0} not supported")]
    UnsupportedContentType(String),

    #[error("object not found")]
    NotFound,

    #[error("network failure")]
    Network,

    #[error("object store backend failure: {0}")]
    Server(String),
}
