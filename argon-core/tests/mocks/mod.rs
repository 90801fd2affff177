//! Mock infrastructure for testing
//!
//! Recording render targets and transports, a scripted capture platform and
//! a fake audio system.

#![allow(dead_code)]

use argon_core::audio::{
    AudioDevice, AudioDeviceId, AudioPlatform, ListenerId, OutputUnit, PropertyAddress,
    PropertyListener,
};
use argon_core::capture::{
    CapturePlatform, DisplayInfo, FrameSink, PlatformStream, RunningApplication,
    ShareableContent, SinkStatus, WindowInfo,
};
use argon_core::config::{CaptureConfiguration, ContentFilter};
use argon_core::error::{ArgonError, Result, TransportScope};
use argon_core::pipeline::RenderTarget;
use argon_core::session::{EventSender, SessionTransport, TransportEvent};
use argon_core::types::{CapturedFrame, FrameBuffer, FrameSize};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Create an opaque test frame
pub fn frame(pts: u64) -> FrameBuffer {
    FrameBuffer::opaque(FrameSize::new(16, 9), pts)
}

/// Create a captured frame of the given content size
pub fn captured(width: u32, height: u32, pts: u64) -> CapturedFrame {
    let size = FrameSize::new(width, height);
    CapturedFrame::new(FrameBuffer::opaque(size, pts), size)
}

/// Render target remembering the pts of every frame it painted
#[derive(Default)]
pub struct RecordingView {
    frames: Mutex<Vec<u64>>,
}

impl RecordingView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<u64> {
        self.frames.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl RenderTarget for RecordingView {
    fn draw_frame(&self, frame: FrameBuffer) {
        self.frames.lock().push(frame.pts());
    }
}

/// Calls a [`RecordingTransport`] received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect,
    Publish,
    Disconnect,
    ConsumeFrame(u64),
}

/// Transport that records calls and lets the test emit events
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    events: Mutex<Option<EventSender>>,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    /// Emit `SessionConnected` from inside `connect`
    auto_connect: Mutex<Option<String>>,
    /// Emit `SessionDisconnected` from inside `disconnect`
    auto_disconnect: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acknowledge connect and disconnect like a live transport would
    pub fn responsive(session_id: &str) -> Arc<Self> {
        let transport = Self::default();
        *transport.auto_connect.lock() = Some(session_id.to_string());
        transport.auto_disconnect.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &TransportCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn consumed(&self) -> Vec<u64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                TransportCall::ConsumeFrame(pts) => Some(*pts),
                _ => None,
            })
            .collect()
    }

    /// Report an event as the transport
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(events) => events.emit(event),
            None => false,
        }
    }
}

impl SessionTransport for RecordingTransport {
    fn connect(&self, events: EventSender) -> Result<()> {
        self.calls.lock().push(TransportCall::Connect);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ArgonError::transport(TransportScope::Session, "refused"));
        }
        if let Some(id) = self.auto_connect.lock().clone() {
            events.emit(TransportEvent::SessionConnected(id));
        }
        *self.events.lock() = Some(events);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        self.calls.lock().push(TransportCall::Disconnect);
        if self.auto_disconnect.load(Ordering::SeqCst) {
            let id = self.auto_connect.lock().clone().unwrap_or_default();
            self.emit(TransportEvent::SessionDisconnected(id));
        }
        Ok(())
    }

    fn publish(&self) -> Result<()> {
        self.calls.lock().push(TransportCall::Publish);
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(ArgonError::transport(TransportScope::Publisher, "refused"));
        }
        Ok(())
    }

    fn consume_frame(&self, frame: FrameBuffer) -> Result<()> {
        self.calls.lock().push(TransportCall::ConsumeFrame(frame.pts()));
        Ok(())
    }
}

/// Shared bookkeeping of a [`ScriptedPlatform`]
#[derive(Default)]
pub struct PlatformLog {
    pub opened: AtomicUsize,
    pub stopped: AtomicUsize,
    pub config_updates: AtomicUsize,
    pub filter_updates: AtomicUsize,
    pub content_queries: AtomicUsize,
    pub last_filter: Mutex<Option<ContentFilter>>,
    pub last_config: Mutex<Option<CaptureConfiguration>>,
    sink: Mutex<Option<FrameSink>>,
}

/// Capture platform driven by the test
pub struct ScriptedPlatform {
    content: Mutex<ShareableContent>,
    deny: AtomicBool,
    fail_open: AtomicBool,
    hang_open: AtomicBool,
    open_gate: Mutex<Option<Arc<Notify>>>,
    pub log: Arc<PlatformLog>,
}

impl ScriptedPlatform {
    /// Two displays, two windows of other apps and one of our own
    pub fn new() -> Arc<Self> {
        let own = RunningApplication {
            app_id: "org.argon".to_string(),
            name: "Argon".to_string(),
            pid: 10,
        };
        let editor = RunningApplication {
            app_id: "org.editor".to_string(),
            name: "Editor".to_string(),
            pid: 11,
        };
        let browser = RunningApplication {
            app_id: "org.browser".to_string(),
            name: "Browser".to_string(),
            pid: 12,
        };
        let content = ShareableContent {
            displays: vec![
                DisplayInfo {
                    id: 1,
                    width: 1440,
                    height: 900,
                },
                DisplayInfo {
                    id: 2,
                    width: 1920,
                    height: 1080,
                },
            ],
            windows: vec![
                window(20, "notes.txt", &editor),
                window(21, "Docs", &browser),
                window(22, "Argon", &own),
            ],
            applications: vec![own, editor, browser],
        };

        Arc::new(Self {
            content: Mutex::new(content),
            deny: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            hang_open: AtomicBool::new(false),
            open_gate: Mutex::new(None),
            log: Arc::new(PlatformLog::default()),
        })
    }

    /// Make the shareable-content query fail
    pub fn deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Never finish opening a stream
    pub fn hang_open(&self, hang: bool) {
        self.hang_open.store(hang, Ordering::SeqCst);
    }

    /// Hold every `open_stream` until the returned gate is notified
    pub fn gate_open(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.open_gate.lock() = Some(gate.clone());
        gate
    }

    /// Offer a frame through the live stream's sink
    pub fn push(&self, frame: CapturedFrame) -> SinkStatus {
        match self.log.sink.lock().as_ref() {
            Some(sink) => sink.try_send(frame),
            None => SinkStatus::Closed,
        }
    }

    /// Send a frame, waiting for capacity
    pub async fn send(&self, frame: CapturedFrame) -> SinkStatus {
        let sink = self.log.sink.lock().clone();
        match sink {
            Some(sink) => sink.send(frame).await,
            None => SinkStatus::Closed,
        }
    }

    /// Streams opened and not stopped
    pub fn live_streams(&self) -> usize {
        self.log.opened.load(Ordering::SeqCst) - self.log.stopped.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.log.opened.load(Ordering::SeqCst)
    }
}

fn window(id: u32, title: &str, app: &RunningApplication) -> WindowInfo {
    WindowInfo {
        id,
        title: Some(title.to_string()),
        frame: FrameSize::new(800, 600),
        owning_application: Some(app.clone()),
        on_screen: true,
    }
}

#[async_trait]
impl CapturePlatform for ScriptedPlatform {
    async fn shareable_content(&self) -> Result<ShareableContent> {
        self.log.content_queries.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(ArgonError::portal("screen capture not authorized"));
        }
        Ok(self.content.lock().clone())
    }

    async fn open_stream(
        &self,
        config: &CaptureConfiguration,
        sink: FrameSink,
    ) -> Result<Box<dyn PlatformStream>> {
        if self.hang_open.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let gate = self.open_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ArgonError::pipewire("node unavailable"));
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        *self.log.last_config.lock() = Some(config.clone());
        *self.log.last_filter.lock() = Some(config.content_filter.clone());
        *self.log.sink.lock() = Some(sink);
        Ok(Box::new(ScriptedStream {
            log: self.log.clone(),
            stopped: false,
        }))
    }
}

struct ScriptedStream {
    log: Arc<PlatformLog>,
    stopped: bool,
}

#[async_trait]
impl PlatformStream for ScriptedStream {
    async fn update_configuration(&mut self, config: &CaptureConfiguration) -> Result<()> {
        self.log.config_updates.fetch_add(1, Ordering::SeqCst);
        *self.log.last_config.lock() = Some(config.clone());
        Ok(())
    }

    async fn update_content_filter(&mut self, filter: &ContentFilter) -> Result<()> {
        self.log.filter_updates.fetch_add(1, Ordering::SeqCst);
        *self.log.last_filter.lock() = Some(filter.clone());
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.stopped {
            self.stopped = true;
            self.log.stopped.fetch_add(1, Ordering::SeqCst);
            *self.log.sink.lock() = None;
        }
        Ok(())
    }
}

/// Audio system with settable default device and manual notifications
pub struct FakeAudio {
    devices: Mutex<Vec<AudioDevice>>,
    default_output: Mutex<AudioDeviceId>,
    listeners: Mutex<HashMap<u64, PropertyListener>>,
    next_listener: AtomicU64,
}

impl FakeAudio {
    /// Built-in speakers (1), a USB DAC (2) and a microphone (3)
    pub fn new() -> Arc<Self> {
        let devices = vec![
            device(1, "BuiltInSpeakers", "Speakers", true, true),
            device(2, "usb-dac-01", "USB DAC", true, false),
            device(3, "BuiltInMic", "Microphone", false, true),
        ];
        Arc::new(Self {
            devices: Mutex::new(devices),
            default_output: Mutex::new(1),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        })
    }

    /// Change the default output and notify listeners
    pub fn set_default_output(&self, id: AudioDeviceId) {
        *self.default_output.lock() = id;
        self.fire(&[PropertyAddress::default_output_device()]);
    }

    /// Invoke every listener with `addresses`
    pub fn fire(&self, addresses: &[PropertyAddress]) {
        let listeners: Vec<PropertyListener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(addresses);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

fn device(id: u32, uid: &str, name: &str, output: bool, built_in: bool) -> AudioDevice {
    AudioDevice {
        id,
        uid: uid.to_string(),
        name: name.to_string(),
        has_output_streams: output,
        is_built_in: built_in,
    }
}

impl AudioPlatform for FakeAudio {
    fn default_output_device(&self) -> Result<AudioDevice> {
        let id = *self.default_output.lock();
        self.devices
            .lock()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| ArgonError::audio(format!("no device {}", id)))
    }

    fn devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(self.devices.lock().clone())
    }

    fn add_listener(
        &self,
        _address: PropertyAddress,
        listener: PropertyListener,
    ) -> Result<ListenerId> {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, listener);
        Ok(ListenerId(id))
    }

    fn remove_listener(&self, id: ListenerId) -> Result<()> {
        self.listeners
            .lock()
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| ArgonError::audio("unknown listener"))
    }
}

/// Output unit recording every device it was pointed at
#[derive(Default)]
pub struct RecordingOutputUnit {
    devices: Mutex<Vec<AudioDeviceId>>,
}

impl RecordingOutputUnit {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn devices(&self) -> Vec<AudioDeviceId> {
        self.devices.lock().clone()
    }
}

impl OutputUnit for RecordingOutputUnit {
    fn set_current_device(&self, device_id: AudioDeviceId) -> Result<()> {
        self.devices.lock().push(device_id);
        Ok(())
    }
}
