//! xdg-desktop-portal screencast platform
//!
//! Uses ashpd to talk to the screencast portal. Wayland does not reveal
//! individual monitors or windows before the user picks one, so the shareable
//! content is one placeholder entry per source type the portal supports; the
//! portal dialog resolves it when a stream is opened.

use ashpd::desktop::screencast::{CursorMode, Screencast, SourceType};
use ashpd::desktop::{PersistMode, Session};
use ashpd::{enumflags2::BitFlags, WindowIdentifier};
use async_trait::async_trait;
use std::os::fd::OwnedFd;
use tracing::{debug, info, warn};

use crate::capture::{
    CapturePlatform, DisplayInfo, FrameSink, PipeWireStream, PlatformStream, RunningApplication,
    ShareableContent, WindowInfo,
};
use crate::config::{CaptureConfiguration, CaptureKind, ContentFilter};
use crate::error::{ArgonError, Result};
use crate::types::FrameSize;

/// Id of the placeholder display entry
pub const PORTAL_DISPLAY_ID: u32 = 0;
/// Id of the placeholder window entry
pub const PORTAL_WINDOW_ID: u32 = 1;

/// Size assumed until the portal reports the real stream size
const FALLBACK_SIZE: FrameSize = FrameSize {
    width: 1920,
    height: 1080,
};

/// Screen capture through the screencast portal and PipeWire
pub struct PortalPlatform {
    screencast: Screencast<'static>,
}

impl PortalPlatform {
    /// Connect to the screencast portal
    pub async fn new() -> Result<Self> {
        let screencast = Screencast::new().await?;
        Ok(Self { screencast })
    }

    async fn start_session(
        &self,
        kind: CaptureKind,
    ) -> Result<(Session<'static, Screencast<'static>>, u32, OwnedFd, Option<FrameSize>)> {
        info!("Creating screencast session via portal");
        let session = self.screencast.create_session().await?;

        let source_type: BitFlags<SourceType> = match kind {
            CaptureKind::Display => SourceType::Monitor.into(),
            CaptureKind::Window => SourceType::Window.into(),
        };
        debug!("Requesting source selection: {:?}", source_type);

        self.screencast
            .select_sources(
                &session,
                CursorMode::Embedded,
                source_type,
                false,
                None,
                PersistMode::DoNot,
            )
            .await?;

        let response = self
            .screencast
            .start(&session, None::<&WindowIdentifier>)
            .await?
            .response()?;

        let Some(stream) = response.streams().first() else {
            return Err(ArgonError::portal("No streams returned from portal"));
        };
        let node_id = stream.pipe_wire_node_id();
        let size = stream
            .size()
            .map(|(w, h)| FrameSize::new(w.max(0) as u32, h.max(0) as u32));

        let fd = self.screencast.open_pipe_wire_remote(&session).await?;
        info!("Screencast session started: node_id={}", node_id);

        Ok((session, node_id, fd, size))
    }
}

#[async_trait]
impl CapturePlatform for PortalPlatform {
    async fn shareable_content(&self) -> Result<ShareableContent> {
        let types = self.screencast.available_source_types().await.map_err(|e| {
            ArgonError::permission_denied(format!("Screencast portal unavailable: {}", e))
        })?;

        let portal_app = RunningApplication {
            app_id: "org.freedesktop.portal.Desktop".to_string(),
            name: "Portal".to_string(),
            pid: 0,
        };

        let mut content = ShareableContent::default();
        if types.contains(SourceType::Monitor) {
            content.displays.push(DisplayInfo {
                id: PORTAL_DISPLAY_ID,
                width: FALLBACK_SIZE.width,
                height: FALLBACK_SIZE.height,
            });
        }
        if types.contains(SourceType::Window) {
            content.windows.push(WindowInfo {
                id: PORTAL_WINDOW_ID,
                title: Some("Select Window".to_string()),
                frame: FrameSize::new(FALLBACK_SIZE.width / 2, FALLBACK_SIZE.height / 2),
                owning_application: Some(portal_app.clone()),
                on_screen: true,
            });
            content.applications.push(portal_app);
        }

        if content.displays.is_empty() && content.windows.is_empty() {
            return Err(ArgonError::permission_denied(
                "Screencast portal offers no source types",
            ));
        }
        Ok(content)
    }

    async fn open_stream(
        &self,
        config: &CaptureConfiguration,
        sink: FrameSink,
    ) -> Result<Box<dyn PlatformStream>> {
        let (session, node_id, fd, size) =
            self.start_session(config.content_filter.kind()).await?;
        if let Some(size) = size {
            debug!("Portal stream size {}x{}", size.width, size.height);
        }

        let stream = match PipeWireStream::spawn(fd, node_id, config, sink) {
            Ok(stream) => stream,
            Err(e) => {
                if let Err(close) = session.close().await {
                    warn!("Failed to close screencast session: {}", close);
                }
                return Err(e);
            }
        };

        Ok(Box::new(PortalStream {
            stream,
            session: Some(session),
        }))
    }
}

/// A PipeWire stream plus the portal session that authorizes it
struct PortalStream {
    stream: PipeWireStream,
    session: Option<Session<'static, Screencast<'static>>>,
}

#[async_trait]
impl PlatformStream for PortalStream {
    async fn update_configuration(&mut self, config: &CaptureConfiguration) -> Result<()> {
        self.stream.update_configuration(config).await
    }

    async fn update_content_filter(&mut self, filter: &ContentFilter) -> Result<()> {
        self.stream.update_content_filter(filter).await
    }

    async fn stop(&mut self) -> Result<()> {
        let result = self.stream.stop().await;
        if let Some(session) = self.session.take() {
            session.close().await?;
            info!("Screencast session closed");
        }
        result
    }
}
