//! In-process loopback transport
//!
//! Behaves like a one-party session: connect and publish are acknowledged
//! immediately, a synthetic camera renders publisher frames, and frames pushed
//! through a custom capturer come back as the remote subscriber's video.

use bytes::Bytes;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ArgonError, Result, TransportScope};
use crate::session::{EventSender, SessionTransport, TransportEvent};
use crate::types::{now_pts, CapturerHandle, FrameBuffer, FrameFormat, FrameSize};

/// Loopback transport settings
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Id reported in `SessionConnected`
    pub session_id: String,
    /// Synthetic camera resolution
    pub camera_size: FrameSize,
    /// Synthetic camera framerate (0 disables the camera)
    pub camera_fps: u32,
    /// Whether to act as a subscriber receiving our own stream
    pub echo_subscriber: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            session_id: "loopback".to_string(),
            camera_size: FrameSize::new(640, 480),
            camera_fps: 30,
            echo_subscriber: true,
        }
    }
}

#[derive(Default)]
struct LoopbackState {
    events: Option<EventSender>,
    connected: bool,
    publishing: bool,
    capturer: Option<CapturerHandle>,
    next_capturer: u64,
    camera: Option<JoinHandle<()>>,
}

/// A transport that talks to itself
pub struct LoopbackTransport {
    config: LoopbackConfig,
    state: Mutex<LoopbackState>,
}

impl LoopbackTransport {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LoopbackState::default()),
        }
    }

    /// Switch the publisher to pushed frames, like a custom capturer starting
    pub fn start_custom_capturer(&self) -> Result<CapturerHandle> {
        let mut state = self.state.lock();
        if !state.publishing {
            return Err(ArgonError::invalid_state("not publishing"));
        }
        if let Some(handle) = state.capturer {
            return Ok(handle);
        }

        state.next_capturer += 1;
        let handle = CapturerHandle::from_raw(state.next_capturer);
        state.capturer = Some(handle);
        info!("Loopback custom capturer {} started", handle);
        emit(&state, TransportEvent::VideoCapturerStart(handle));
        Ok(handle)
    }

    /// Return the publisher to the synthetic camera
    pub fn stop_custom_capturer(&self) {
        let mut state = self.state.lock();
        if let Some(handle) = state.capturer.take() {
            info!("Loopback custom capturer {} destroyed", handle);
            emit(&state, TransportEvent::VideoCapturerDestroy(handle));
        }
    }

    /// Whether a custom capturer is active
    pub fn has_custom_capturer(&self) -> bool {
        self.state.lock().capturer.is_some()
    }

    fn spawn_camera(&self, events: EventSender) -> Option<JoinHandle<()>> {
        if self.config.camera_fps == 0 {
            return None;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime, loopback camera disabled");
            return None;
        };

        let size = self.config.camera_size;
        let period = Duration::from_secs(1) / self.config.camera_fps;
        let pixels = Bytes::from(test_pattern(size));

        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let frame = FrameBuffer::new(
                    FrameFormat::bgrx(size.width, size.height),
                    pixels.clone(),
                    now_pts(),
                );
                if !events.emit(TransportEvent::PublisherRenderFrame(frame)) {
                    debug!("Session queue closed, loopback camera stopping");
                    break;
                }
            }
        }))
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(LoopbackConfig::default())
    }
}

impl SessionTransport for LoopbackTransport {
    fn connect(&self, events: EventSender) -> Result<()> {
        let mut state = self.state.lock();
        if state.connected {
            return Ok(());
        }
        state.connected = true;
        state.events = Some(events);
        emit(
            &state,
            TransportEvent::SessionConnected(self.config.session_id.clone()),
        );
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Ok(());
        }

        if let Some(camera) = state.camera.take() {
            camera.abort();
        }
        if let Some(handle) = state.capturer.take() {
            emit(&state, TransportEvent::VideoCapturerDestroy(handle));
        }
        if state.publishing && self.config.echo_subscriber {
            emit(&state, TransportEvent::SubscriberDisconnected);
        }
        emit(
            &state,
            TransportEvent::SessionDisconnected(self.config.session_id.clone()),
        );

        state.connected = false;
        state.publishing = false;
        state.events = None;
        Ok(())
    }

    fn publish(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ArgonError::transport(
                TransportScope::Publisher,
                "publish before connect",
            ));
        }
        if state.publishing {
            return Ok(());
        }
        state.publishing = true;

        if self.config.echo_subscriber {
            emit(&state, TransportEvent::SubscriberConnected);
        }
        if let Some(events) = state.events.clone() {
            state.camera = self.spawn_camera(events);
        }
        Ok(())
    }

    fn consume_frame(&self, frame: FrameBuffer) -> Result<()> {
        let state = self.state.lock();
        if state.capturer.is_none() {
            return Err(ArgonError::invalid_state("no custom capturer active"));
        }
        if self.config.echo_subscriber {
            emit(&state, TransportEvent::SubscriberRenderFrame(frame));
        }
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        if let Some(camera) = self.state.get_mut().camera.take() {
            camera.abort();
        }
    }
}

fn emit(state: &LoopbackState, event: TransportEvent) {
    if let Some(events) = &state.events {
        events.emit(event);
    }
}

/// Vertical BGRx color bars
fn test_pattern(size: FrameSize) -> Vec<u8> {
    const BARS: [[u8; 4]; 4] = [
        [255, 255, 255, 255],
        [0, 255, 255, 255],
        [255, 255, 0, 255],
        [0, 255, 0, 255],
    ];
    let mut data = Vec::with_capacity((size.width * size.height * 4) as usize);
    for _ in 0..size.height {
        for x in 0..size.width {
            let bar = (x as usize * BARS.len()) / size.width.max(1) as usize;
            data.extend_from_slice(&BARS[bar.min(BARS.len() - 1)]);
        }
    }
    data
}
