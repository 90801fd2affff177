//! Share command - screen sharing into a loopback session

use anyhow::{Context, Result};
use argon_core::audio::{AudioPlatform, OutputUnit, PipeWireAudio};
use argon_core::capture::PortalPlatform;
use argon_core::config::{CaptureKind, ConfigFile};
use argon_core::session::{LoopbackConfig, LoopbackTransport, SessionAlert};
use argon_core::types::FrameBuffer;
use argon_core::{Controller, ControllerParts, RenderTarget};
use clap::Args;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// Arguments for the share command
#[derive(Args)]
pub struct ShareArgs {
    /// What to share (display, window); defaults to the config file
    #[arg(short, long)]
    kind: Option<String>,

    /// Output preset (720p30, 720p60, 1080p30, 1080p60, 1440p30, 1440p60, 4k30, 4k60)
    #[arg(short, long)]
    preset: Option<String>,

    /// Framerate cap when no preset is given
    #[arg(short, long)]
    fps: Option<u32>,

    /// Frames buffered ahead of the consumer
    #[arg(short, long)]
    queue_depth: Option<u32>,

    /// Show Argon's own windows in display captures
    #[arg(long)]
    include_self: bool,

    /// Seconds between status lines
    #[arg(long, default_value = "5")]
    status_interval: u64,
}

/// Counts frames painted on one view
#[derive(Default)]
struct FrameCounter {
    frames: AtomicU64,
}

impl FrameCounter {
    fn count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl RenderTarget for FrameCounter {
    fn draw_frame(&self, _frame: FrameBuffer) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

/// Follow the default output through PipeWire; sharing goes on without it
async fn connect_audio(
    playback_stream: String,
) -> Option<(Arc<dyn AudioPlatform>, Arc<dyn OutputUnit>)> {
    let connected =
        tokio::task::spawn_blocking(|| PipeWireAudio::connect(Duration::from_secs(2))).await;
    let platform = match connected {
        Ok(Ok(platform)) => platform,
        Ok(Err(e)) => {
            warn!("Audio routing disabled: {}", e);
            return None;
        }
        Err(e) => {
            warn!("Audio routing disabled: {}", e);
            return None;
        }
    };
    match platform.output_unit(playback_stream) {
        Ok(output) => {
            let output: Arc<dyn OutputUnit> = Arc::new(output);
            let platform: Arc<dyn AudioPlatform> = platform;
            Some((platform, output))
        }
        Err(e) => {
            warn!("Audio routing disabled: {}", e);
            None
        }
    }
}

/// Run a screen share until Ctrl+C
pub async fn share(args: ShareArgs) -> Result<()> {
    println!("Argon - Screen Share\n");

    let file = ConfigFile::load_or_default();
    let mut capture = file.capture.clone();
    if let Some(kind) = args.kind {
        capture.kind = kind;
    }
    if let Some(preset) = args.preset {
        capture.preset = preset;
    }
    if let Some(fps) = args.fps {
        capture.fps = fps;
    }
    if let Some(depth) = args.queue_depth {
        capture.queue_depth = depth;
    }
    if args.include_self {
        capture.exclude_self = false;
    }
    let kind: CaptureKind = capture.capture_kind().context("Invalid capture kind")?;
    capture.preset().context("Invalid preset")?;

    let transport = Arc::new(LoopbackTransport::new(LoopbackConfig::default()));
    let platform = Arc::new(
        PortalPlatform::new()
            .await
            .context("Failed to connect to the screencast portal")?,
    );
    let publisher = Arc::new(FrameCounter::default());
    let subscriber = Arc::new(FrameCounter::default());
    let preview = Arc::new(FrameCounter::default());
    let audio = if file.audio.follow_default_output {
        connect_audio(file.audio.playback_stream.clone()).await
    } else {
        None
    };

    let controller = Controller::new(ControllerParts {
        transport: transport.clone(),
        capture_platform: platform,
        audio,
        publisher_view: publisher.clone(),
        subscriber_view: subscriber.clone(),
        preview: preview.clone(),
        session: file.session.to_session_config(),
        capture,
        own_app_id: Some("argon".to_string()),
    })
    .context("Failed to create controller")?;
    let mut alerts = controller.alerts();
    if let Some(route) = controller.audio_route() {
        println!("Audio output: {}", route);
    }

    controller.connect().await.context("Failed to connect")?;
    let session_id = controller
        .wait_connected()
        .await
        .context("Session did not connect")?;
    println!("Session '{}' connected", session_id);

    println!("Waiting for source selection...");
    println!("(A dialog should appear to select your screen or window)\n");
    controller
        .start_screen_share(kind)
        .await
        .context("Failed to start screen share")?;

    controller
        .session()
        .wait_until(Duration::from_secs(10), |s| s.publisher_connected)
        .await
        .context("Publisher did not start")?;
    let capturer = transport
        .start_custom_capturer()
        .context("Failed to switch the publisher to screen frames")?;
    info!("Publishing screen frames through capturer {}", capturer);

    println!("Sharing! Press Ctrl+C to stop...\n");

    let mut ticker = tokio::time::interval(Duration::from_secs(args.status_interval.max(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                println!("\nReceived interrupt signal...");
                break;
            }
            alert = alerts.recv() => match alert {
                Ok(SessionAlert::Error { scope, message }) => {
                    eprintln!("{} error: {}", scope, message);
                }
                Ok(SessionAlert::Ended { session_id }) => {
                    println!("Session '{}' ended", session_id);
                    break;
                }
                Err(_) => {}
            },
            _ = ticker.tick() => {
                let stats = controller.pipeline().stats();
                let size = controller
                    .content_size()
                    .map(|s| format!("{}x{}", s.width, s.height))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "preview {:>6}  sent {:>6}  remote {:>6}  camera {:>6}  dropped {:>4}  size {}",
                    preview.count(),
                    stats.injected,
                    subscriber.count(),
                    publisher.count(),
                    stats.dropped,
                    size
                );
            }
        }
    }

    println!("Stopping screen share...");
    transport.stop_custom_capturer();
    if let Some(stats) = controller.stop_screen_share().await? {
        println!(
            "Shared {} frames ({} sent, {} size changes)",
            stats.frames, stats.injected, stats.size_changes
        );
    }
    controller.shutdown().await?;
    println!("Stopped.");

    Ok(())
}
