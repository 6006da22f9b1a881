use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use voclaria_live::{
    CaptureConfig, CaptureController, MediaKind, MemoryBackend, MemoryBackendConfig,
    SimulatedDevice, UploadPipeline, RECORDING_TTL,
};

/// Drive a simulated capture from permission to uploaded artifact.
#[derive(Parser)]
struct Args {
    /// File to stand in for the recorded media
    #[arg(long)]
    media: PathBuf,

    /// Declared MIME type of the media file
    #[arg(long, default_value = "video/mp4")]
    mime: String,

    /// Seconds to keep "recording" before stopping
    #[arg(long, default_value_t = 3)]
    duration: u64,

    /// Reject the declared MIME type server-side to show the fallback
    #[arg(long)]
    reject_mime: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    info!("🎥 Starting capture → upload walkthrough");

    // 1. Simulated device producing the given file
    let device = SimulatedDevice::new(args.media.clone(), args.mime.clone());
    let probe = device.probe();
    let mut controller =
        CaptureController::new(Box::new(device), MediaKind::Video, CaptureConfig::default());

    // 2. Permission, bind, record
    controller.start().await.context("capture start failed")?;
    info!(
        "✅ Recording (facing {:?}, bound: {})",
        controller.facing(),
        probe.is_bound()
    );
    sleep(Duration::from_secs(args.duration)).await;

    // 3. Stop and collect the artifact
    let artifact = controller.stop().await.context("capture stop failed")?;
    info!(
        "⏹️  Artifact ready: {} ({}s, {})",
        artifact.local_path.display(),
        artifact.duration_secs,
        artifact.mime_type
    );

    // 4. Upload with a week-long retrieval window
    let backend = MemoryBackend::new(MemoryBackendConfig::default());
    if args.reject_mime {
        backend.reject_content_type(&args.mime);
        info!("🚫 Backend will reject {} (fallback expected)", args.mime);
    }
    let pipeline = UploadPipeline::new(Arc::new(backend.clone()), "recordings");
    let handle = pipeline
        .upload(&artifact, RECORDING_TTL)
        .await
        .context("upload failed")?;

    let stored = backend
        .object(&handle.object_path)
        .context("uploaded object missing")?;
    info!(
        "📤 Uploaded {} as {} ({} bytes)",
        handle.object_path,
        stored.content_type,
        stored.bytes.len()
    );
    info!("🔗 Retrieval URL (expires {}): {}", handle.expires_at, handle.retrieval_url);

    Ok(())
}
