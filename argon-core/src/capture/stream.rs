//! PipeWire stream handling for screencast capture
//!
//! Runs the PipeWire main loop on a dedicated thread, negotiates a raw video
//! format and pushes every dequeued buffer into a [`FrameSink`]. Size and
//! framerate changes are renegotiated on the live stream through a control
//! channel attached to the loop.

use async_trait::async_trait;
use bytes::Bytes;
use pipewire as pw;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::param::video::VideoFormat;
use pw::spa::pod::Pod;
use pw::spa::utils::{Direction, Fraction, Rectangle};
use pw::stream::{Stream, StreamFlags, StreamState};

use std::os::fd::OwnedFd;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::capture::{FrameSink, PlatformStream, SinkStatus};
use crate::config::{CaptureConfiguration, ContentFilter};
use crate::error::{ArgonError, Result};
use crate::types::{now_pts, CapturedFrame, FrameBuffer, FrameFormat, FrameSize};

/// Largest size and rate we offer in format negotiation
const MAX_DIMENSION: u32 = 8192;
const MAX_FPS: u32 = 240;

/// Messages from the async side into the PipeWire loop
enum Control {
    Renegotiate { size: FrameSize, fps: u32 },
    Shutdown,
}

/// Negotiated video format
#[derive(Debug, Clone, Copy)]
struct VideoInfo {
    format: VideoFormat,
    width: u32,
    height: u32,
}

impl VideoInfo {
    /// DRM fourcc for the negotiated format
    fn fourcc(&self) -> u32 {
        match self.format {
            VideoFormat::BGRx | VideoFormat::xRGB => 0x34325258, // XR24
            VideoFormat::BGRA => 0x34324142,                     // AB24
            VideoFormat::RGBx => 0x34325842,                     // BX24
            VideoFormat::RGBA | VideoFormat::ABGR => 0x34324241, // BA24
            VideoFormat::ARGB => 0x34325241,                     // AR24
            VideoFormat::xBGR => 0x34324258,                     // XB24
            _ => 0x34325258,
        }
    }

    fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

/// Live PipeWire screencast stream
pub struct PipeWireStream {
    control: Option<pw::channel::Sender<Control>>,
    thread: Option<std::thread::JoinHandle<()>>,
    running: Arc<AtomicBool>,
    node_id: u32,
}

impl PipeWireStream {
    /// Connect to `node_id` over the portal's PipeWire remote
    pub fn spawn(
        fd: OwnedFd,
        node_id: u32,
        config: &CaptureConfiguration,
        sink: FrameSink,
    ) -> Result<Self> {
        let (control_tx, control_rx) = pw::channel::channel::<Control>();
        let running = Arc::new(AtomicBool::new(false));

        let size = config.target_size();
        let fps = config.fps();
        let thread_running = running.clone();

        let thread = std::thread::Builder::new()
            .name("argon-pipewire".to_string())
            .spawn(move || {
                if let Err(e) =
                    run_pipewire_loop(fd, node_id, size, fps, sink, control_rx, &thread_running)
                {
                    error!("PipeWire loop error: {}", e);
                }
                thread_running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| ArgonError::pipewire(format!("Failed to spawn PipeWire thread: {}", e)))?;

        Ok(Self {
            control: Some(control_tx),
            thread: Some(thread),
            running,
            node_id,
        })
    }

    /// Whether PipeWire reports the stream as streaming
    pub fn is_streaming(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    fn send(&self, control: Control) -> Result<()> {
        let sender = self
            .control
            .as_ref()
            .ok_or_else(|| ArgonError::invalid_state("capture stream stopped"))?;
        sender
            .send(control)
            .map_err(|_| ArgonError::pipewire("PipeWire loop is not running"))
    }

    fn shutdown(&mut self) -> Option<std::thread::JoinHandle<()>> {
        if let Some(control) = self.control.take() {
            let _ = control.send(Control::Shutdown);
        }
        self.thread.take()
    }
}

#[async_trait]
impl PlatformStream for PipeWireStream {
    async fn update_configuration(&mut self, config: &CaptureConfiguration) -> Result<()> {
        debug!(
            "Renegotiating node {} to {}x{} @ {}fps",
            self.node_id,
            config.target_width,
            config.target_height,
            config.fps()
        );
        self.send(Control::Renegotiate {
            size: config.target_size(),
            fps: config.fps(),
        })
    }

    async fn update_content_filter(&mut self, filter: &ContentFilter) -> Result<()> {
        // The portal has no per-application exclusion; the compositor decides
        // what appears in a monitor stream
        if !filter.excluded_apps().is_empty() {
            debug!(
                "Ignoring {} application exclusions on portal stream",
                filter.excluded_apps().len()
            );
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        info!("Stopping PipeWire stream for node {}", self.node_id);
        if let Some(thread) = self.shutdown() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|e| ArgonError::pipewire(format!("Join failed: {}", e)))?
                .map_err(|_| ArgonError::pipewire("PipeWire thread panicked"))?;
        }
        self.running.store(false, Ordering::SeqCst);
        info!("PipeWire stream stopped");
        Ok(())
    }
}

impl Drop for PipeWireStream {
    fn drop(&mut self) {
        if let Some(thread) = self.shutdown() {
            let _ = thread.join();
        }
    }
}

/// Run the PipeWire main loop (called from the dedicated thread)
fn run_pipewire_loop(
    fd: OwnedFd,
    node_id: u32,
    size: FrameSize,
    fps: u32,
    sink: FrameSink,
    control_rx: pw::channel::Receiver<Control>,
    running: &Arc<AtomicBool>,
) -> Result<()> {
    pw::init();

    info!("Initializing PipeWire capture for node {}", node_id);

    let mainloop = pw::main_loop::MainLoop::new(None)
        .map_err(|e| ArgonError::pipewire(format!("Failed to create main loop: {}", e)))?;

    let context = pw::context::Context::new(&mainloop)
        .map_err(|e| ArgonError::pipewire(format!("Failed to create context: {}", e)))?;

    let core = context
        .connect_fd(fd, None)
        .map_err(|e| ArgonError::pipewire(format!("Failed to connect to PipeWire fd: {}", e)))?;

    struct UserData {
        format: Option<VideoInfo>,
        sink: FrameSink,
        running: Arc<AtomicBool>,
    }

    let stream = Rc::new(
        Stream::new(
            &core,
            "argon-capture",
            pw::properties::properties! {
                *pw::keys::MEDIA_TYPE => "Video",
                *pw::keys::MEDIA_CATEGORY => "Capture",
                *pw::keys::MEDIA_ROLE => "Screen",
            },
        )
        .map_err(|e| ArgonError::pipewire(format!("Failed to create stream: {}", e)))?,
    );

    let user_data = UserData {
        format: None,
        sink: sink.clone(),
        running: running.clone(),
    };

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(|_, user_data, old, new| {
            debug!("Stream state changed: {:?} -> {:?}", old, new);
            match new {
                StreamState::Streaming => {
                    info!("PipeWire stream is now streaming");
                    user_data.running.store(true, Ordering::SeqCst);
                }
                StreamState::Error(msg) => {
                    error!("Stream error: {}", msg);
                    user_data.running.store(false, Ordering::SeqCst);
                }
                StreamState::Paused => {
                    debug!("Stream paused, capture source may be hidden");
                }
                StreamState::Unconnected => {
                    info!("Stream disconnected");
                    user_data.running.store(false, Ordering::SeqCst);
                }
                _ => {}
            }
        })
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != pw::spa::param::ParamType::Format.as_raw() {
                return;
            }

            let Ok((media_type, media_subtype)) = format_utils::parse_format(param) else {
                return;
            };
            if media_type != MediaType::Video || media_subtype != MediaSubtype::Raw {
                return;
            }

            let mut video_info = pw::spa::param::video::VideoInfoRaw::new();
            if video_info.parse(param).is_err() {
                warn!("Failed to parse video format");
                return;
            }

            let info = VideoInfo {
                format: video_info.format(),
                width: video_info.size().width,
                height: video_info.size().height,
            };
            info!(
                "Video format negotiated: {:?} {}x{} @ {}/{}fps",
                info.format,
                info.width,
                info.height,
                video_info.framerate().num,
                video_info.framerate().denom
            );
            user_data.format = Some(info);
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                trace!("No buffer available");
                return;
            };
            let Some(format) = user_data.format else {
                trace!("No format yet, skipping frame");
                return;
            };
            if user_data.sink.is_closed() {
                return;
            }

            let datas = buffer.datas_mut();
            let Some(data) = datas.first_mut() else {
                return;
            };

            let chunk_size = data.chunk().size() as usize;
            let chunk_stride = data.chunk().stride() as u32;
            if chunk_size == 0 {
                return;
            }

            if let Some(slice) = data.data() {
                // The buffer goes back to PipeWire when `buffer` drops
                let pixels = Bytes::copy_from_slice(&slice[..chunk_size.min(slice.len())]);
                let frame = FrameBuffer::new(
                    FrameFormat {
                        width: format.width,
                        height: format.height,
                        fourcc: format.fourcc(),
                        stride: chunk_stride,
                    },
                    pixels,
                    now_pts(),
                );

                match user_data
                    .sink
                    .try_send(CapturedFrame::new(frame, format.size()))
                {
                    SinkStatus::Accepted | SinkStatus::Throttled | SinkStatus::Backpressure => {}
                    SinkStatus::Closed => trace!("Frame sink closed, discarding frame"),
                }
            }
        })
        .register()
        .map_err(|e| ArgonError::pipewire(format!("Failed to register listener: {}", e)))?;

    let values = format_params(size, fps)?;
    let pod = Pod::from_bytes(&values)
        .ok_or_else(|| ArgonError::pipewire("Failed to create Pod from serialized format"))?;
    let mut params = [pod];

    stream
        .connect(
            Direction::Input,
            Some(node_id),
            StreamFlags::AUTOCONNECT | StreamFlags::MAP_BUFFERS,
            &mut params,
        )
        .map_err(|e| ArgonError::pipewire(format!("Failed to connect stream: {}", e)))?;

    info!("PipeWire stream connected to node {}", node_id);

    let mainloop_weak = mainloop.downgrade();
    let control_stream = stream.clone();
    let _control = control_rx.attach(mainloop.loop_(), move |control| match control {
        Control::Renegotiate { size, fps } => {
            let values = match format_params(size, fps) {
                Ok(values) => values,
                Err(e) => {
                    warn!("{}", e);
                    return;
                }
            };
            let Some(pod) = Pod::from_bytes(&values) else {
                warn!("Failed to create Pod for renegotiation");
                return;
            };
            if let Err(e) = control_stream.update_params(&mut [pod]) {
                warn!("Failed to renegotiate stream format: {}", e);
            }
        }
        Control::Shutdown => {
            info!("Shutdown signal received");
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    mainloop.run();

    if let Err(e) = stream.disconnect() {
        debug!("Stream disconnect failed: {}", e);
    }
    info!("PipeWire main loop ended");
    Ok(())
}

/// Serialize an EnumFormat pod preferring `size` and `fps`
fn format_params(size: FrameSize, fps: u32) -> Result<Vec<u8>> {
    let obj = pw::spa::pod::object!(
        pw::spa::utils::SpaTypes::ObjectParamFormat,
        pw::spa::param::ParamType::EnumFormat,
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::MediaType,
            Id,
            MediaType::Video
        ),
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::MediaSubtype,
            Id,
            MediaSubtype::Raw
        ),
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::VideoFormat,
            Choice,
            Enum,
            Id,
            VideoFormat::BGRx,
            VideoFormat::BGRx,
            VideoFormat::BGRA,
            VideoFormat::RGBx,
            VideoFormat::RGBA,
            VideoFormat::xRGB,
            VideoFormat::ARGB,
            VideoFormat::xBGR,
            VideoFormat::ABGR
        ),
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::VideoSize,
            Choice,
            Range,
            Rectangle,
            Rectangle {
                width: size.width.clamp(1, MAX_DIMENSION),
                height: size.height.clamp(1, MAX_DIMENSION)
            },
            Rectangle {
                width: 1,
                height: 1
            },
            Rectangle {
                width: MAX_DIMENSION,
                height: MAX_DIMENSION
            }
        ),
        pw::spa::pod::property!(
            pw::spa::param::format::FormatProperties::VideoFramerate,
            Choice,
            Range,
            Fraction,
            Fraction {
                num: fps.min(MAX_FPS),
                denom: 1
            },
            Fraction { num: 0, denom: 1 },
            Fraction {
                num: MAX_FPS,
                denom: 1
            }
        ),
    );

    let values = pw::spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &pw::spa::pod::Value::Object(obj),
    )
    .map_err(|e| ArgonError::pipewire(format!("Failed to serialize format: {:?}", e)))?
    .0
    .into_inner();
    Ok(values)
}
