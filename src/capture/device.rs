use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::CaptureError;

/// What the artifact carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn default_mime(self) -> &'static str {
        match self {
            MediaKind::Video => "video/mp4",
            MediaKind::Audio => "audio/mp4",
        }
    }
}

/// Camera orientation preference. Alternated between remount attempts as a
/// recovery heuristic for transient bind failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Front,
    Back,
}

impl CameraFacing {
    pub fn toggled(self) -> Self {
        match self {
            CameraFacing::Front => CameraFacing::Back,
            CameraFacing::Back => CameraFacing::Front,
        }
    }
}

/// One bind attempt. The token is freshly minted per attempt to force a
/// hardware rebind rather than reusing a stale pipeline.
#[derive(Debug, Clone)]
pub struct BindRequest {
    pub binding_token: Uuid,
    pub facing: CameraFacing,
    pub kind: MediaKind,
}

/// Signals delivered by the hardware layer while binding.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Ready,
    MountError(String),
}

/// A finalized recording as reported by the device.
#[derive(Debug, Clone)]
pub struct RecordedMedia {
    pub path: PathBuf,
    pub mime_type: String,
}

/// Hardware seam consumed by the capture controller.
///
/// Implementations wrap the platform capture stack. `request_permission`
/// must be atomic over everything the kind needs (camera and mic for video,
/// mic for audio): a partial grant is a denial.
#[async_trait]
pub trait CaptureDevice: Send {
    async fn request_permission(&mut self, kind: MediaKind) -> Result<bool, CaptureError>;

    /// Bind the hardware. Readiness or mount failure arrives on the
    /// returned channel; the device must not be considered ready until the
    /// explicit signal.
    async fn bind(
        &mut self,
        request: BindRequest,
    ) -> Result<mpsc::Receiver<DeviceEvent>, CaptureError>;

    async fn start(&mut self) -> Result<(), CaptureError>;

    async fn stop(&mut self) -> Result<RecordedMedia, CaptureError>;

    /// Release the hardware handle. Must be safe to call repeatedly.
    async fn release(&mut self);
}

/// Scripted outcome for one `SimulatedDevice` bind attempt.
#[derive(Debug, Clone)]
pub enum BindOutcome {
    Ready,
    ReadyAfter(Duration),
    MountError(String),
    /// Never signals; the controller's bind timeout fires.
    Silent,
}

#[derive(Default)]
struct SimState {
    permission: bool,
    outcomes: VecDeque<BindOutcome>,
    bind_requests: Vec<BindRequest>,
    releases: usize,
    bound: bool,
    recording: bool,
    // Keeps Silent bind channels open so they time out instead of closing.
    parked_senders: Vec<mpsc::Sender<DeviceEvent>>,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-process capture device for development and tests, in the same spirit
/// as a file-backed audio source: no hardware, fully scriptable.
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
    artifact_path: PathBuf,
    artifact_mime: String,
}

impl SimulatedDevice {
    /// A device that grants permission and binds ready immediately,
    /// producing `artifact_path` with `artifact_mime` when stopped.
    pub fn new(artifact_path: PathBuf, artifact_mime: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                permission: true,
                ..SimState::default()
            })),
            artifact_path,
            artifact_mime: artifact_mime.into(),
        }
    }

    pub fn deny_permission(self) -> Self {
        lock(&self.state).permission = false;
        self
    }

    /// Script the outcomes of successive bind attempts. Attempts beyond the
    /// script succeed immediately.
    pub fn with_bind_outcomes(self, outcomes: Vec<BindOutcome>) -> Self {
        lock(&self.state).outcomes = outcomes.into();
        self
    }

    /// Inspection handle that stays valid after the device moves into a
    /// controller.
    pub fn probe(&self) -> DeviceProbe {
        DeviceProbe {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl CaptureDevice for SimulatedDevice {
    async fn request_permission(&mut self, _kind: MediaKind) -> Result<bool, CaptureError> {
        Ok(lock(&self.state).permission)
    }

    async fn bind(
        &mut self,
        request: BindRequest,
    ) -> Result<mpsc::Receiver<DeviceEvent>, CaptureError> {
        let mut state = lock(&self.state);
        if state.bound {
            // The "device busy" bug class: a prior handle was not released.
            return Err(CaptureError::Device(
                "device busy: previous handle not released".to_string(),
            ));
        }
        state.bound = true;
        state.bind_requests.push(request);

        let outcome = state.outcomes.pop_front().unwrap_or(BindOutcome::Ready);
        let (tx, rx) = mpsc::channel(4);
        match outcome {
            BindOutcome::Ready => {
                let _ = tx.try_send(DeviceEvent::Ready);
            }
            BindOutcome::ReadyAfter(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(DeviceEvent::Ready).await;
                });
            }
            BindOutcome::MountError(message) => {
                let _ = tx.try_send(DeviceEvent::MountError(message));
            }
            BindOutcome::Silent => {
                state.parked_senders.push(tx);
            }
        }
        Ok(rx)
    }

    async fn start(&mut self) -> Result<(), CaptureError> {
        let mut state = lock(&self.state);
        if !state.bound {
            return Err(CaptureError::Device("start before bind".to_string()));
        }
        state.recording = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<RecordedMedia, CaptureError> {
        let mut state = lock(&self.state);
        if !state.recording {
            return Err(CaptureError::NotRecording);
        }
        state.recording = false;
        Ok(RecordedMedia {
            path: self.artifact_path.clone(),
            mime_type: self.artifact_mime.clone(),
        })
    }

    async fn release(&mut self) {
        let mut state = lock(&self.state);
        state.bound = false;
        state.recording = false;
        state.releases += 1;
        state.parked_senders.clear();
    }
}

/// Read-only view into a `SimulatedDevice`'s recorded interactions.
pub struct DeviceProbe {
    state: Arc<Mutex<SimState>>,
}

impl DeviceProbe {
    pub fn bind_requests(&self) -> Vec<BindRequest> {
        lock(&self.state).bind_requests.clone()
    }

    pub fn release_count(&self) -> usize {
        lock(&self.state).releases
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.state).bound
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.state).recording
    }
}
