//! Core types for Argon
//!
//! These types represent the frames and identifiers that flow between the
//! session transport, the capture stream and the render targets.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a custom video capturer owned by the transport
///
/// The transport hands one out when it switches the publisher to externally
/// supplied frames and hands the same value back when it destroys it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapturerHandle(u64);

impl CapturerHandle {
    /// Wrap a raw transport capturer identifier
    ///
    /// Zero is reserved for "no capturer" and is mapped to 1.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw.max(1))
    }

    /// Get the raw identifier
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CapturerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Capturer({:#x})", self.0)
    }
}

/// Which end of the session a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoRole {
    /// The local outgoing stream
    Publisher,
    /// A remote incoming stream
    Subscriber,
}

impl std::fmt::Display for VideoRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoRole::Publisher => write!(f, "publisher"),
            VideoRole::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// Pixel dimensions of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for FrameSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Frame format information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFormat {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format (DRM fourcc)
    pub fourcc: u32,
    /// Stride in bytes
    pub stride: u32,
}

impl FrameFormat {
    /// Packed 32-bit BGRx format for the given size
    pub fn bgrx(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fourcc: FOURCC_XR24,
            stride: width * 4,
        }
    }

    /// Get the dimensions of this format
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }
}

/// DRM fourcc for packed BGRx
pub const FOURCC_XR24: u32 = 0x34325258;

/// A single decoded video frame
///
/// Cloning is cheap: pixel data is reference counted and never copied when a
/// frame is routed. Render targets receive the buffer by value and must not
/// keep it past the draw call.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    format: FrameFormat,
    data: Bytes,
    pts: u64,
}

impl FrameBuffer {
    /// Create a frame from its format and pixel data
    pub fn new(format: FrameFormat, data: impl Into<Bytes>, pts: u64) -> Self {
        Self {
            format,
            data: data.into(),
            pts,
        }
    }

    /// A frame that carries only dimensions, for transports that keep pixel
    /// data on their side
    pub fn opaque(size: FrameSize, pts: u64) -> Self {
        Self::new(FrameFormat::bgrx(size.width, size.height), Bytes::new(), pts)
    }

    /// Frame format
    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Pixel dimensions
    pub fn size(&self) -> FrameSize {
        self.format.size()
    }

    /// Raw pixel data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Presentation timestamp in nanoseconds
    pub fn pts(&self) -> u64 {
        self.pts
    }
}

/// A frame produced by the capture stream together with its content size
///
/// `size` is the size of the captured content, which can differ from the
/// buffer's dimensions while the platform is scaling to a new target size.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// The captured pixels
    pub buffer: FrameBuffer,
    /// Size of the captured content
    pub size: FrameSize,
}

impl CapturedFrame {
    pub fn new(buffer: FrameBuffer, size: FrameSize) -> Self {
        Self { buffer, size }
    }
}

/// Current wall clock time in nanoseconds, used as a presentation timestamp
pub fn now_pts() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
