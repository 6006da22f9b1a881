use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::CaptureConfig;
use super::device::{BindRequest, CameraFacing, CaptureDevice, DeviceEvent, MediaKind};
use super::link::{EngagedSession, LiveSessionLink};
use super::{CaptureArtifact, SPEAKING_TIPS};
use crate::error::CaptureError;
use crate::presence::PresenceHandle;
use crate::reactions::ReactionAggregator;

/// Capture state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    PermissionPending,
    DeviceBinding,
    Recording,
    Stopping,
    Finished,
    BindingFailed,
}

/// Drives one capture device from permission negotiation to a finished
/// artifact. The device handle is exclusively owned here; no other
/// controller instance may touch it concurrently.
pub struct CaptureController {
    device: Box<dyn CaptureDevice>,
    config: CaptureConfig,
    kind: MediaKind,
    state: CaptureState,
    facing: CameraFacing,
    started_at: Option<Instant>,
    frozen: Option<Duration>,
    elapsed_tx: Arc<watch::Sender<u64>>,
    elapsed_rx: watch::Receiver<u64>,
    tip_tx: Arc<watch::Sender<&'static str>>,
    tip_rx: watch::Receiver<&'static str>,
    ticker: Option<JoinHandle<()>>,
    tip_task: Option<JoinHandle<()>>,
    link: Option<LiveSessionLink>,
    engaged: Option<EngagedSession>,
}

impl CaptureController {
    pub fn new(device: Box<dyn CaptureDevice>, kind: MediaKind, config: CaptureConfig) -> Self {
        let (elapsed_tx, elapsed_rx) = watch::channel(0);
        let (tip_tx, tip_rx) = watch::channel(SPEAKING_TIPS[0]);
        let facing = config.preferred_facing;

        Self {
            device,
            config,
            kind,
            state: CaptureState::Idle,
            facing,
            started_at: None,
            frozen: None,
            elapsed_tx: Arc::new(elapsed_tx),
            elapsed_rx,
            tip_tx: Arc::new(tip_tx),
            tip_rx,
            ticker: None,
            tip_task: None,
            link: None,
            engaged: None,
        }
    }

    /// Tie this capture to a shared live session. Presence, reactions and
    /// attendance engage when recording starts.
    pub fn attach_session(&mut self, link: LiveSessionLink) {
        self.link = Some(link);
    }

    /// Acquire permissions, bind the device, and start recording.
    ///
    /// Permissions are atomic: a partial grant never starts a degraded
    /// capture. Binding waits for the explicit device-ready signal with a
    /// bounded window, and performs at most `remount_attempts` recovery
    /// remounts, toggling the camera facing between attempts.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        match self.state {
            CaptureState::Idle | CaptureState::Finished | CaptureState::BindingFailed => {}
            _ => {
                return Err(CaptureError::Device(format!(
                    "cannot start from {:?}",
                    self.state
                )))
            }
        }

        self.frozen = None;
        self.state = CaptureState::PermissionPending;
        let granted = match self.device.request_permission(self.kind).await {
            Ok(granted) => granted,
            Err(e) => {
                self.state = CaptureState::Idle;
                return Err(e);
            }
        };
        if !granted {
            info!("Capture permission denied");
            self.state = CaptureState::Idle;
            return Err(CaptureError::PermissionDenied);
        }

        let attempts = 1 + self.config.remount_attempts;
        let mut facing = self.config.preferred_facing;
        let mut last_error = CaptureError::BindFailed("no bind attempt made".to_string());

        for attempt in 0..attempts {
            if attempt > 0 {
                // Fully release the prior handle before rebinding, then
                // alternate facing as the recovery heuristic.
                self.device.release().await;
                facing = facing.toggled();
                warn!(
                    "Remounting capture device (attempt {}/{}, facing {:?})",
                    attempt + 1,
                    attempts,
                    facing
                );
            }

            self.state = CaptureState::DeviceBinding;
            self.facing = facing;
            let request = BindRequest {
                binding_token: Uuid::new_v4(),
                facing,
                kind: self.kind,
            };
            debug!("Binding capture device, token {}", request.binding_token);

            let mut events = match self.device.bind(request).await {
                Ok(events) => events,
                Err(e) => {
                    self.state = CaptureState::BindingFailed;
                    last_error = e;
                    continue;
                }
            };

            match timeout(self.config.bind_timeout, events.recv()).await {
                Ok(Some(DeviceEvent::Ready)) => match self.device.start().await {
                    Ok(()) => {
                        self.enter_recording().await;
                        return Ok(());
                    }
                    Err(e) => {
                        self.state = CaptureState::BindingFailed;
                        last_error = e;
                    }
                },
                Ok(Some(DeviceEvent::MountError(message))) => {
                    self.state = CaptureState::BindingFailed;
                    last_error = CaptureError::BindFailed(message);
                }
                Ok(None) => {
                    self.state = CaptureState::BindingFailed;
                    last_error = CaptureError::BindFailed("device event channel closed".to_string());
                }
                Err(_) => {
                    self.state = CaptureState::BindingFailed;
                    last_error = CaptureError::BindTimeout(self.config.bind_timeout);
                }
            }
        }

        self.device.release().await;
        self.state = CaptureState::BindingFailed;
        error!("Capture bind gave up after {} attempts: {}", attempts, last_error);
        Err(last_error)
    }

    async fn enter_recording(&mut self) {
        let started = Instant::now();
        self.started_at = Some(started);
        self.elapsed_tx.send_replace(0);

        // Elapsed time derives from the monotonic start instant at every
        // tick; nothing accumulates, so a delayed tick cannot drift it.
        let elapsed_tx = Arc::clone(&self.elapsed_tx);
        let tick_every = self.config.timer_tick;
        self.ticker = Some(tokio::spawn(async move {
            let mut tick = interval(tick_every);
            loop {
                tick.tick().await;
                elapsed_tx.send_replace(started.elapsed().as_secs());
            }
        }));

        let tip_tx = Arc::clone(&self.tip_tx);
        let rotate_every = self.config.tip_rotation;
        self.tip_task = Some(tokio::spawn(async move {
            let mut tick = interval(rotate_every);
            let mut index = 0;
            loop {
                tick.tick().await;
                index = (index + 1) % SPEAKING_TIPS.len();
                tip_tx.send_replace(SPEAKING_TIPS[index]);
            }
        }));

        if let Some(link) = &self.link {
            self.engaged = Some(link.engage().await);
        }

        self.state = CaptureState::Recording;
        info!("Recording started ({:?}, facing {:?})", self.kind, self.facing);
    }

    /// Finalize the recording into an artifact. The elapsed counter is
    /// frozen from the monotonic start timestamp and reported alongside.
    pub async fn stop(&mut self) -> Result<CaptureArtifact, CaptureError> {
        if self.state != CaptureState::Recording {
            return Err(CaptureError::NotRecording);
        }

        self.state = CaptureState::Stopping;
        let frozen = self
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default();

        let media = match self.device.stop().await {
            Ok(media) => media,
            Err(e) => {
                self.teardown().await;
                self.state = CaptureState::Idle;
                return Err(e);
            }
        };

        self.frozen = Some(frozen);
        self.elapsed_tx.send_replace(frozen.as_secs());
        self.teardown().await;
        self.state = CaptureState::Finished;

        info!(
            "Recording finished: {}s, {}",
            frozen.as_secs(),
            media.mime_type
        );

        Ok(CaptureArtifact {
            local_path: media.path,
            media_kind: self.kind,
            duration_secs: frozen.as_secs(),
            mime_type: media.mime_type,
        })
    }

    /// Abort-safe teardown from any state. Stops an active recording
    /// without losing the completed artifact, then reverses side effects.
    pub async fn close(&mut self) -> Option<CaptureArtifact> {
        match self.state {
            CaptureState::Recording => match self.stop().await {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    warn!("Recording stop during close failed: {}", e);
                    None
                }
            },
            _ => {
                self.teardown().await;
                if self.state != CaptureState::Finished {
                    self.state = CaptureState::Idle;
                }
                None
            }
        }
    }

    /// Reverse every recording side effect exactly once, in dependency
    /// order: channels unsubscribe before the attendance record closes,
    /// and the device handle releases last.
    async fn teardown(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(tip_task) = self.tip_task.take() {
            tip_task.abort();
        }
        if let Some(engaged) = self.engaged.take() {
            if let Some(link) = &self.link {
                link.disengage(engaged).await;
            }
        }
        self.device.release().await;
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn facing(&self) -> CameraFacing {
        self.facing
    }

    /// Elapsed recording time: frozen once stopped, live while recording.
    pub fn elapsed(&self) -> Duration {
        self.frozen.unwrap_or_else(|| {
            self.started_at
                .map(|started| started.elapsed())
                .unwrap_or_default()
        })
    }

    /// Whole-second elapsed counter sampled at the configured tick rate.
    pub fn watch_elapsed(&self) -> watch::Receiver<u64> {
        self.elapsed_rx.clone()
    }

    /// The advisory coaching tip currently rotated in.
    pub fn watch_tips(&self) -> watch::Receiver<&'static str> {
        self.tip_rx.clone()
    }

    /// Presence membership while engaged with a shared session.
    pub fn presence(&self) -> Option<&PresenceHandle> {
        self.engaged.as_ref()?.presence.as_ref()
    }

    /// Reaction aggregator while engaged with a shared session.
    pub fn reactions(&self) -> Option<&ReactionAggregator> {
        self.engaged.as_ref()?.reactions.as_ref()
    }

    pub fn session_link(&self) -> Option<&LiveSessionLink> {
        self.link.as_ref()
    }
}
