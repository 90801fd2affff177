//! Application-level owner of a call
//!
//! Wires the session runner, frame pipeline, capture manager and audio route
//! monitor together and exposes the operations a front end needs.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{AudioOutputRoute, AudioPlatform, OutputUnit, RouteMonitor};
use crate::capture::{
    CaptureManager, CapturePlatform, ContentCatalog, ScreenShare, ShareStats, UpdateKind,
};
use crate::config::{CaptureConfiguration, CaptureKind, CaptureSettings, SessionConfig};
use crate::error::{ArgonError, Result};
use crate::pipeline::{FrameDeliveryPipeline, RenderTarget};
use crate::session::{SessionAlert, SessionHandle, SessionRunner, SessionSnapshot, SessionTransport};
use crate::types::FrameSize;

/// Everything a [`Controller`] is built from
pub struct ControllerParts {
    pub transport: Arc<dyn SessionTransport>,
    pub capture_platform: Arc<dyn CapturePlatform>,
    /// Audio hardware; `None` disables output following
    pub audio: Option<(Arc<dyn AudioPlatform>, Arc<dyn OutputUnit>)>,
    pub publisher_view: Arc<dyn RenderTarget>,
    pub subscriber_view: Arc<dyn RenderTarget>,
    /// Local preview of the captured screen
    pub preview: Arc<dyn RenderTarget>,
    pub session: SessionConfig,
    pub capture: CaptureSettings,
    /// Our application id, hidden from window lists and display captures
    pub own_app_id: Option<String>,
}

struct ShareTask {
    kind: CaptureKind,
    handle: JoinHandle<ShareStats>,
}

/// Owns one call's session, capture and audio routing
pub struct Controller {
    pipeline: Arc<FrameDeliveryPipeline>,
    session: SessionHandle,
    session_config: SessionConfig,
    runner: JoinHandle<()>,
    capture: Arc<CaptureManager>,
    capture_settings: CaptureSettings,
    exclude_self: AtomicBool,
    catalog: Arc<ContentCatalog>,
    refresh: JoinHandle<()>,
    preview: Arc<dyn RenderTarget>,
    share: tokio::sync::Mutex<Option<ShareTask>>,
    content_size: Arc<Mutex<Option<FrameSize>>>,
    route_monitor: Option<RouteMonitor>,
    route_follower: Option<JoinHandle<()>>,
}

impl Controller {
    /// Build the controller and start its background tasks
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(parts: ControllerParts) -> Result<Self> {
        let pipeline = Arc::new(FrameDeliveryPipeline::new(
            parts.publisher_view,
            parts.subscriber_view,
            parts.transport.clone(),
        ));
        let capture = Arc::new(CaptureManager::new(parts.capture_platform.clone()));

        let (runner, session) =
            SessionRunner::new(parts.transport, pipeline.clone(), &parts.session);
        let runner = runner.with_capture(capture.clone()).spawn();

        let catalog = Arc::new(ContentCatalog::new(parts.own_app_id));
        let refresh = catalog.spawn_refresh(
            parts.capture_platform,
            Duration::from_secs(parts.capture.refresh_secs.max(1)),
        );

        let (route_monitor, route_follower) = match parts.audio {
            Some((platform, unit)) => {
                let monitor = RouteMonitor::install(platform)?;
                let follower = monitor.follower(unit).spawn();
                (Some(monitor), Some(follower))
            }
            None => (None, None),
        };

        info!("Controller ready");
        Ok(Self {
            pipeline,
            session,
            session_config: parts.session,
            runner,
            capture,
            exclude_self: AtomicBool::new(parts.capture.exclude_self),
            capture_settings: parts.capture,
            catalog,
            refresh,
            preview: parts.preview,
            share: tokio::sync::Mutex::new(None),
            content_size: Arc::new(Mutex::new(None)),
            route_monitor,
            route_follower,
        })
    }

    /// Establish the session; publishing follows automatically
    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await
    }

    /// Start publishing explicitly
    pub async fn publish(&self) -> Result<()> {
        self.session.publish().await
    }

    /// Leave the session; a running screen share is stopped with it
    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }

    /// Wait for the session to connect, up to the configured timeout
    pub async fn wait_connected(&self) -> Result<String> {
        self.session
            .wait_connected(self.session_config.connect_timeout)
            .await
    }

    /// Latest session state
    pub fn state(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.session.subscribe()
    }

    pub fn alerts(&self) -> broadcast::Receiver<SessionAlert> {
        self.session.alerts()
    }

    /// Start sharing the selected display or window
    ///
    /// Returns `false` if a share is already running.
    pub async fn start_screen_share(&self, kind: CaptureKind) -> Result<bool> {
        let mut share = self.share.lock().await;
        if self.capture.is_running() {
            debug!("Screen share already running");
            return Ok(false);
        }
        if let Some(done) = share.take() {
            // Previous loop ended on its own (session end)
            let _ = done.handle.await;
        }

        let config = self.configuration(kind).await?;
        let Some(frames) = self.capture.start(config).await? else {
            return Ok(false);
        };

        let sizes = self.content_size.clone();
        let handle = ScreenShare::new(self.preview.clone(), self.pipeline.clone())
            .on_size_change(move |size| *sizes.lock() = Some(size))
            .spawn(frames);
        *share = Some(ShareTask { kind, handle });
        info!("Screen share started ({})", kind);
        Ok(true)
    }

    /// Re-apply the current selection to a running share
    ///
    /// The selection setters below call this on their own; use it directly
    /// after changing the catalog selection behind the controller's back.
    pub async fn update_screen_share(&self, kind: CaptureKind) -> Result<UpdateKind> {
        let mut share = self.share.lock().await;
        if !self.capture.is_running() {
            return Err(ArgonError::invalid_state("screen share is not running"));
        }
        let config = self.configuration(kind).await?;
        let update = self.capture.update(config).await?;
        if let Some(task) = share.as_mut() {
            task.kind = kind;
        }
        debug!("Screen share updated: {:?}", update);
        Ok(update)
    }

    /// Stop sharing; returns the finished loop's counters
    pub async fn stop_screen_share(&self) -> Result<Option<ShareStats>> {
        let mut share = self.share.lock().await;
        self.capture.stop().await?;
        *self.content_size.lock() = None;

        let Some(task) = share.take() else {
            return Ok(None);
        };
        match task.handle.await {
            Ok(stats) => {
                info!("Screen share stopped ({} frames)", stats.frames);
                Ok(Some(stats))
            }
            Err(e) => {
                warn!("Screen share task failed: {}", e);
                Ok(None)
            }
        }
    }

    pub fn is_sharing(&self) -> bool {
        self.capture.is_running()
    }

    /// What the running share captures
    pub async fn sharing_kind(&self) -> Option<CaptureKind> {
        if !self.capture.is_running() {
            return None;
        }
        self.share.lock().await.as_ref().map(|task| task.kind)
    }

    /// Size of the content currently being captured
    pub fn content_size(&self) -> Option<FrameSize> {
        *self.content_size.lock()
    }

    /// Capture `kind` from now on; a running share switches over
    pub async fn set_capture_kind(&self, kind: CaptureKind) -> Result<Option<UpdateKind>> {
        self.follow_selection(Some(kind)).await
    }

    /// Select the display to share; a running share follows the selection
    pub async fn select_display(&self, id: u32) -> Result<Option<UpdateKind>> {
        if !self.catalog.select_display(id) {
            return Err(ArgonError::invalid_state(format!("display {} is not shareable", id)));
        }
        self.follow_selection(None).await
    }

    /// Select the window to share; a running share follows the selection
    pub async fn select_window(&self, id: u32) -> Result<Option<UpdateKind>> {
        if !self.catalog.select_window(id) {
            return Err(ArgonError::invalid_state(format!("window {} is not shareable", id)));
        }
        self.follow_selection(None).await
    }

    /// Hide or show our own application in display captures
    pub async fn set_exclude_self(&self, exclude: bool) -> Result<Option<UpdateKind>> {
        if self.exclude_self.swap(exclude, Ordering::SeqCst) == exclude {
            return Ok(None);
        }
        self.follow_selection(None).await
    }

    pub fn exclude_self(&self) -> bool {
        self.exclude_self.load(Ordering::SeqCst)
    }

    pub fn catalog(&self) -> &Arc<ContentCatalog> {
        &self.catalog
    }

    pub fn pipeline(&self) -> &Arc<FrameDeliveryPipeline> {
        &self.pipeline
    }

    pub fn capture(&self) -> &Arc<CaptureManager> {
        &self.capture
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Route the audio engine is currently told to use
    pub fn audio_route(&self) -> Option<AudioOutputRoute> {
        self.route_monitor
            .as_ref()
            .and_then(|m| m.current_route())
            .map(|route| route.as_ref().clone())
    }

    pub fn route_monitor(&self) -> Option<&RouteMonitor> {
        self.route_monitor.as_ref()
    }

    /// Stop sharing, leave the session and stop the runner
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down controller");
        if let Err(e) = self.stop_screen_share().await {
            warn!("Failed to stop screen share: {}", e);
        }
        if self.session.snapshot().connection != crate::session::ConnectionState::Disconnected {
            if let Err(e) = self.session.disconnect().await {
                warn!("Failed to disconnect: {}", e);
            }
        }
        self.session.shutdown().await?;
        Ok(())
    }

    /// Update a running share after a selection change; `None` when idle
    async fn follow_selection(&self, kind: Option<CaptureKind>) -> Result<Option<UpdateKind>> {
        let Some(current) = self.sharing_kind().await else {
            return Ok(None);
        };
        self.update_screen_share(kind.unwrap_or(current))
            .await
            .map(Some)
    }

    async fn configuration(&self, kind: CaptureKind) -> Result<CaptureConfiguration> {
        let settings = &self.capture_settings;
        let exclude_self = self.exclude_self();
        let mut config = self
            .catalog
            .configuration(kind, settings.scale_factor, exclude_self);
        if config.is_none() {
            self.catalog
                .refresh(self.capture.platform().as_ref())
                .await
                .map_err(|e| ArgonError::permission_denied(e.to_string()))?;
            config = self
                .catalog
                .configuration(kind, settings.scale_factor, exclude_self);
        }
        let config = config
            .ok_or_else(|| ArgonError::stream_start(format!("no shareable {} available", kind)))?;
        settings.apply_to(config)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.refresh.abort();
        if let Some(follower) = self.route_follower.take() {
            follower.abort();
        }
        if !self.runner.is_finished() {
            self.session.events().command(crate::session::SessionCommand::Shutdown);
        }
    }
}
