//! Capture state machine
//!
//! Drives a capture device (camera+mic or mic-only) through
//! `Idle → PermissionPending → DeviceBinding → Recording → Stopping →
//! Finished`, with bounded remount recovery on bind failures. Produces a
//! `CaptureArtifact` consumed exactly once by the upload pipeline.
//!
//! The controller exclusively owns the device handle: a remount fully
//! releases the prior handle before rebinding, and every exit path reverses
//! the recording side effects exactly once.

mod config;
mod controller;
mod device;
mod link;

pub use config::CaptureConfig;
pub use controller::{CaptureController, CaptureState};
pub use device::{
    BindOutcome, BindRequest, CameraFacing, CaptureDevice, DeviceEvent, DeviceProbe, MediaKind,
    RecordedMedia, SimulatedDevice,
};
pub use link::LiveSessionLink;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A finished local recording, owned by the capturing client until handed
/// to the upload pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureArtifact {
    pub local_path: PathBuf,
    pub media_kind: MediaKind,
    pub duration_secs: u64,
    pub mime_type: String,
}

/// Advisory on-screen coaching lines rotated while recording. Cosmetic.
pub const SPEAKING_TIPS: [&str; 7] = [
    "Speak clearly and steadily",
    "Use gestures for emphasis",
    "Stand tall for confidence",
    "Look at the camera",
    "Change tone to engage",
    "Pause after key points",
    "Smile to seem approachable",
];
