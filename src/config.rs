use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::capture::{CameraFacing, CaptureConfig};
use crate::presence::PresenceConfig;
use crate::transport::NatsTransportConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub presence: PresenceSection,
    #[serde(default)]
    pub capture: CaptureSection,
    #[serde(default)]
    pub upload: UploadSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub url: String,
    pub heartbeat_interval_ms: u64,
    pub presence_expiry_ms: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        let defaults = NatsTransportConfig::default();
        Self {
            url: defaults.url,
            heartbeat_interval_ms: defaults.heartbeat_interval.as_millis() as u64,
            presence_expiry_ms: defaults.presence_expiry.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PresenceSection {
    pub debounce_ms: u64,
    pub resubscribe_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for PresenceSection {
    fn default() -> Self {
        let defaults = PresenceConfig::default();
        Self {
            debounce_ms: defaults.debounce.as_millis() as u64,
            resubscribe_backoff_ms: defaults.resubscribe_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub bind_timeout_ms: u64,
    pub remount_attempts: u32,
    pub timer_tick_ms: u64,
    pub tip_rotation_secs: u64,
    pub preferred_facing: CameraFacing,
}

impl Default for CaptureSection {
    fn default() -> Self {
        let defaults = CaptureConfig::default();
        Self {
            bind_timeout_ms: defaults.bind_timeout.as_millis() as u64,
            remount_attempts: defaults.remount_attempts,
            timer_tick_ms: defaults.timer_tick.as_millis() as u64,
            tip_rotation_secs: defaults.tip_rotation.as_secs(),
            preferred_facing: defaults.preferred_facing,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UploadSection {
    pub prefix: String,
    pub recording_ttl_secs: u64,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            prefix: "recordings".to_string(),
            recording_ttl_secs: crate::upload::RECORDING_TTL.as_secs(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn transport_config(&self) -> NatsTransportConfig {
        NatsTransportConfig {
            url: self.transport.url.clone(),
            heartbeat_interval: Duration::from_millis(self.transport.heartbeat_interval_ms),
            presence_expiry: Duration::from_millis(self.transport.presence_expiry_ms),
        }
    }

    pub fn presence_config(&self) -> PresenceConfig {
        PresenceConfig {
            debounce: Duration::from_millis(self.presence.debounce_ms),
            resubscribe_backoff: Duration::from_millis(self.presence.resubscribe_backoff_ms),
            max_backoff: Duration::from_millis(self.presence.max_backoff_ms),
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            bind_timeout: Duration::from_millis(self.capture.bind_timeout_ms),
            remount_attempts: self.capture.remount_attempts,
            timer_tick: Duration::from_millis(self.capture.timer_tick_ms),
            tip_rotation: Duration::from_secs(self.capture.tip_rotation_secs),
            preferred_facing: self.capture.preferred_facing,
        }
    }

    pub fn recording_ttl(&self) -> Duration {
        Duration::from_secs(self.upload.recording_ttl_secs)
    }
}
