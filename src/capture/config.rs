use std::time::Duration;

use super::device::CameraFacing;

/// Tunables for the capture state machine.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// How long to wait for the device-ready signal before a bind attempt
    /// is declared failed. Readiness is only ever taken from the explicit
    /// signal, never assumed from elapsed time.
    pub bind_timeout: Duration,

    /// Remount attempts after the first bind failure. Caps retry storms
    /// while covering the common transient-bind-failure case.
    pub remount_attempts: u32,

    /// Sampling period for the elapsed-time counter. The counter derives
    /// from a monotonic start timestamp, so the tick rate affects display
    /// latency only, never accuracy.
    pub timer_tick: Duration,

    /// Rotation period for the advisory coaching tips.
    pub tip_rotation: Duration,

    pub preferred_facing: CameraFacing,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            bind_timeout: Duration::from_millis(2200),
            remount_attempts: 2,
            timer_tick: Duration::from_millis(250),
            tip_rotation: Duration::from_secs(4),
            preferred_facing: CameraFacing::Front,
        }
    }
}
