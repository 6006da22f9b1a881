// Integration tests for the capture state machine
//
// These tests script a simulated device through the bind/remount protocol:
// atomic permission checks, bounded ready-signal waits, facing-toggled
// remounts with fresh binding tokens, and exactly-once teardown.

use anyhow::Result;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;
use voclaria_live::{
    BindOutcome, CameraFacing, CaptureConfig, CaptureController, CaptureError, CaptureState,
    MediaKind, SimulatedDevice,
};

fn media_file(dir: &TempDir) -> Result<std::path::PathBuf> {
    let path = dir.path().join("take.mp4");
    fs::write(&path, b"not really video")?;
    Ok(path)
}

fn fast_config() -> CaptureConfig {
    CaptureConfig {
        bind_timeout: Duration::from_millis(100),
        timer_tick: Duration::from_millis(25),
        ..CaptureConfig::default()
    }
}

#[tokio::test]
async fn records_and_produces_artifact() -> Result<()> {
    let dir = TempDir::new()?;
    let path = media_file(&dir)?;

    let device = SimulatedDevice::new(path.clone(), "video/mp4");
    let probe = device.probe();
    let mut controller = CaptureController::new(Box::new(device), MediaKind::Video, fast_config());

    controller.start().await?;
    assert_eq!(controller.state(), CaptureState::Recording);
    assert!(probe.is_recording());

    sleep(Duration::from_millis(100)).await;
    let artifact = controller.stop().await?;

    assert_eq!(controller.state(), CaptureState::Finished);
    assert_eq!(artifact.local_path, path);
    assert_eq!(artifact.mime_type, "video/mp4");
    assert!(!probe.is_bound(), "device released after stop");
    assert!(probe.release_count() >= 1);
    Ok(())
}

#[tokio::test]
async fn permission_denied_never_binds() -> Result<()> {
    let dir = TempDir::new()?;
    let device = SimulatedDevice::new(media_file(&dir)?, "video/mp4").deny_permission();
    let probe = device.probe();
    let mut controller = CaptureController::new(Box::new(device), MediaKind::Video, fast_config());

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::PermissionDenied));
    assert_eq!(controller.state(), CaptureState::Idle);
    assert!(probe.bind_requests().is_empty(), "no degraded capture attempt");
    Ok(())
}

#[tokio::test]
async fn mount_error_remounts_with_toggled_facing() -> Result<()> {
    let dir = TempDir::new()?;
    let device = SimulatedDevice::new(media_file(&dir)?, "video/mp4").with_bind_outcomes(vec![
        BindOutcome::MountError("simulated mount failure".to_string()),
        BindOutcome::Ready,
    ]);
    let probe = device.probe();
    let mut controller = CaptureController::new(Box::new(device), MediaKind::Video, fast_config());

    controller.start().await?;
    assert_eq!(controller.state(), CaptureState::Recording);

    let requests = probe.bind_requests();
    assert_eq!(requests.len(), 2, "one remount after the mount error");
    assert_eq!(requests[0].facing, CameraFacing::Front);
    assert_eq!(requests[1].facing, CameraFacing::Back, "facing toggled for the remount");
    assert_ne!(
        requests[0].binding_token, requests[1].binding_token,
        "remount forces a fresh hardware bind"
    );
    assert!(probe.release_count() >= 1, "prior handle released before rebinding");

    controller.stop().await?;
    Ok(())
}

#[tokio::test]
async fn silent_device_exhausts_remount_budget() -> Result<()> {
    let dir = TempDir::new()?;
    let device = SimulatedDevice::new(media_file(&dir)?, "video/mp4").with_bind_outcomes(vec![
        BindOutcome::Silent,
        BindOutcome::Silent,
        BindOutcome::Silent,
    ]);
    let probe = device.probe();
    let mut controller = CaptureController::new(Box::new(device), MediaKind::Video, fast_config());

    let err = controller.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::BindTimeout(_)), "timeout, not a hang: {err}");
    assert_eq!(controller.state(), CaptureState::BindingFailed);

    let facings: Vec<_> = probe.bind_requests().iter().map(|r| r.facing).collect();
    assert_eq!(
        facings,
        vec![CameraFacing::Front, CameraFacing::Back, CameraFacing::Front],
        "initial attempt plus two remounts, alternating facing"
    );
    assert!(!probe.is_bound(), "device not left bound after giving up");
    Ok(())
}

#[tokio::test]
async fn restart_after_bind_failure_succeeds() -> Result<()> {
    let dir = TempDir::new()?;
    let path = media_file(&dir)?;
    let device = SimulatedDevice::new(path, "video/mp4").with_bind_outcomes(vec![
        BindOutcome::Silent,
        BindOutcome::Silent,
        BindOutcome::Silent,
    ]);
    let mut controller = CaptureController::new(Box::new(device), MediaKind::Video, fast_config());

    assert!(controller.start().await.is_err());
    assert_eq!(controller.state(), CaptureState::BindingFailed);

    // The scripted outcomes are spent; the device binds cleanly now.
    controller.start().await?;
    assert_eq!(controller.state(), CaptureState::Recording);
    controller.stop().await?;
    Ok(())
}

#[tokio::test]
async fn elapsed_freezes_on_stop() -> Result<()> {
    let dir = TempDir::new()?;
    let device = SimulatedDevice::new(media_file(&dir)?, "video/mp4");
    let mut controller = CaptureController::new(Box::new(device), MediaKind::Video, fast_config());

    controller.start().await?;
    sleep(Duration::from_millis(150)).await;
    let while_recording = controller.elapsed();
    assert!(while_recording >= Duration::from_millis(100));

    let artifact = controller.stop().await?;
    let frozen = controller.elapsed();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.elapsed(), frozen, "counter frozen after stop");
    assert_eq!(artifact.duration_secs, frozen.as_secs());
    Ok(())
}

#[tokio::test]
async fn stop_without_recording_is_an_error() -> Result<()> {
    let dir = TempDir::new()?;
    let device = SimulatedDevice::new(media_file(&dir)?, "video/mp4");
    let mut controller = CaptureController::new(Box::new(device), MediaKind::Video, fast_config());

    let err = controller.stop().await.unwrap_err();
    assert!(matches!(err, CaptureError::NotRecording));
    Ok(())
}

#[tokio::test]
async fn close_during_recording_keeps_artifact() -> Result<()> {
    let dir = TempDir::new()?;
    let path = media_file(&dir)?;
    let device = SimulatedDevice::new(path.clone(), "video/mp4");
    let probe = device.probe();
    let mut controller = CaptureController::new(Box::new(device), MediaKind::Video, fast_config());

    controller.start().await?;
    let artifact = controller.close().await;

    assert_eq!(artifact.expect("artifact from abort-safe close").local_path, path);
    assert_eq!(controller.state(), CaptureState::Finished);
    assert!(!probe.is_bound());
    Ok(())
}
