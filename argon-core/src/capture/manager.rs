//! Capture stream lifecycle
//!
//! `start`, `update` and `stop` are serialized on one async mutex, so a
//! configuration is never changed while a stream is being opened or torn
//! down. The consumer's [`FrameStream`] outlives platform stream restarts.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capture::{CapturePlatform, FrameSink, FrameStream, PlatformStream, ShareableContent};
use crate::config::{CaptureConfiguration, CaptureTarget};
use crate::error::{ArgonError, Result};

/// Capture lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Idle => write!(f, "idle"),
            CaptureState::Starting => write!(f, "starting"),
            CaptureState::Running => write!(f, "running"),
            CaptureState::Stopping => write!(f, "stopping"),
        }
    }
}

/// How an `update` was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Configuration was identical
    Unchanged,
    /// Applied to the live platform stream
    InPlace,
    /// Captured display/window changed; the platform stream was replaced
    Restarted,
}

struct ActiveCapture {
    config: CaptureConfiguration,
    stream: Box<dyn PlatformStream>,
    sink: FrameSink,
}

/// Owns at most one running capture stream
pub struct CaptureManager {
    platform: Arc<dyn CapturePlatform>,
    active: tokio::sync::Mutex<Option<ActiveCapture>>,
    state: watch::Sender<CaptureState>,
    config: Mutex<Option<CaptureConfiguration>>,
}

impl CaptureManager {
    pub fn new(platform: Arc<dyn CapturePlatform>) -> Self {
        let (state, _) = watch::channel(CaptureState::Idle);
        Self {
            platform,
            active: tokio::sync::Mutex::new(None),
            state,
            config: Mutex::new(None),
        }
    }

    /// Start capturing
    ///
    /// Returns the frame sequence, or `None` if capture is already running.
    /// Dropping the returned future before it resolves leaves the manager
    /// idle with no platform stream open.
    pub async fn start(&self, config: CaptureConfiguration) -> Result<Option<FrameStream>> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            debug!("Capture already running, ignoring start");
            return Ok(None);
        }

        config.validate_strict().map_err(ArgonError::config)?;
        for warning in config.validate() {
            warn!("{}", warning);
        }

        info!(
            "Starting capture: {:?} at {}x{} @ {}fps",
            config.content_filter.target(),
            config.target_width,
            config.target_height,
            config.fps()
        );
        let reset = IdleOnDrop::new(&self.state, CaptureState::Starting);

        let content = self.query_content().await?;
        ensure_target_exists(&content, &config)?;

        let (sink, frames) =
            FrameSink::channel(config.queue_depth, config.frame_interval.as_duration());
        let stream = match self.platform.open_stream(&config, sink.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                sink.cancel();
                warn!("Failed to open capture stream: {}", e);
                return Err(ArgonError::stream_start(e.to_string()));
            }
        };

        *self.config.lock() = Some(config.clone());
        *active = Some(ActiveCapture {
            config,
            stream,
            sink,
        });
        reset.finish(CaptureState::Running);
        info!("Capture running");
        Ok(Some(frames))
    }

    /// Reconfigure the running capture
    ///
    /// Resolution, frame interval and exclusions are applied in place; a
    /// different display or window replaces the platform stream while the
    /// consumer keeps reading the same sequence. A new queue depth takes
    /// effect on the next `start`.
    pub async fn update(&self, config: CaptureConfiguration) -> Result<UpdateKind> {
        let mut guard = self.active.lock().await;
        let Some(active) = guard.as_mut() else {
            return Err(ArgonError::invalid_state("capture is not running"));
        };

        if active.config == config {
            return Ok(UpdateKind::Unchanged);
        }
        config.validate_strict().map_err(ArgonError::config)?;
        if active.config.queue_depth != config.queue_depth {
            debug!(
                "Queue depth {} -> {} applies on next start",
                active.config.queue_depth, config.queue_depth
            );
        }

        if active.config.requires_restart(&config) {
            info!(
                "Capture target changed to {:?}, restarting stream",
                config.content_filter.target()
            );
            if let Err(e) = active.stream.stop().await {
                warn!("Failed to stop previous capture stream: {}", e);
            }
            active.sink.set_min_interval(config.frame_interval.as_duration());

            match self.platform.open_stream(&config, active.sink.clone()).await {
                Ok(stream) => {
                    active.stream = stream;
                    active.config = config.clone();
                    *self.config.lock() = Some(config);
                    Ok(UpdateKind::Restarted)
                }
                Err(e) => {
                    // Old stream is gone; end the sequence rather than leave
                    // the consumer waiting on nothing
                    if let Some(active) = guard.take() {
                        active.sink.cancel();
                    }
                    *self.config.lock() = None;
                    self.state.send_replace(CaptureState::Idle);
                    warn!("Failed to restart capture stream: {}", e);
                    Err(ArgonError::stream_start(e.to_string()))
                }
            }
        } else {
            if active.config.properties_differ(&config) {
                debug!(
                    "Updating capture properties: {}x{} @ {}fps",
                    config.target_width,
                    config.target_height,
                    config.fps()
                );
                active.stream.update_configuration(&config).await?;
                active.sink.set_min_interval(config.frame_interval.as_duration());
            }
            if active.config.content_filter != config.content_filter {
                debug!(
                    "Updating content filter, {} excluded apps",
                    config.content_filter.excluded_apps().len()
                );
                active
                    .stream
                    .update_content_filter(&config.content_filter)
                    .await?;
            }
            active.config = config.clone();
            *self.config.lock() = Some(config);
            Ok(UpdateKind::InPlace)
        }
    }

    /// Stop capturing
    ///
    /// Once this returns the frame sequence yields no further frames.
    /// Stopping an idle manager is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let mut guard = self.active.lock().await;
        let Some(mut active) = guard.take() else {
            return Ok(());
        };

        info!("Stopping capture");
        let reset = IdleOnDrop::new(&self.state, CaptureState::Stopping);
        active.sink.cancel();
        *self.config.lock() = None;

        let result = active.stream.stop().await;
        if let Err(e) = &result {
            warn!("Capture stream did not stop cleanly: {}", e);
        }
        reset.finish(CaptureState::Idle);
        info!("Capture stopped");
        result
    }

    pub fn state(&self) -> CaptureState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == CaptureState::Running
    }

    /// Watch lifecycle transitions
    pub fn subscribe_state(&self) -> watch::Receiver<CaptureState> {
        self.state.subscribe()
    }

    /// Configuration of the running capture
    pub fn configuration(&self) -> Option<CaptureConfiguration> {
        self.config.lock().clone()
    }

    pub fn platform(&self) -> &Arc<dyn CapturePlatform> {
        &self.platform
    }

    async fn query_content(&self) -> Result<ShareableContent> {
        self.platform.shareable_content().await.map_err(|e| {
            warn!("Shareable content query failed: {}", e);
            if e.is_permission_denied() {
                e
            } else {
                ArgonError::permission_denied(e.to_string())
            }
        })
    }
}

fn ensure_target_exists(content: &ShareableContent, config: &CaptureConfiguration) -> Result<()> {
    let found = match config.content_filter.target() {
        CaptureTarget::Display(id) => content.displays.iter().any(|d| d.id == id),
        CaptureTarget::Window(id) => content.windows.iter().any(|w| w.id == id),
    };
    if found {
        Ok(())
    } else {
        Err(ArgonError::stream_start(format!(
            "{:?} is not shareable",
            config.content_filter.target()
        )))
    }
}

/// Publishes a transitional state and falls back to Idle if dropped early
struct IdleOnDrop<'a> {
    state: &'a watch::Sender<CaptureState>,
    armed: bool,
}

impl<'a> IdleOnDrop<'a> {
    fn new(state: &'a watch::Sender<CaptureState>, transitional: CaptureState) -> Self {
        state.send_replace(transitional);
        Self { state, armed: true }
    }

    fn finish(mut self, next: CaptureState) {
        self.armed = false;
        self.state.send_replace(next);
    }
}

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(CaptureState::Idle);
        }
    }
}
