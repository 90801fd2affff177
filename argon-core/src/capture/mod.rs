//! Screen capture
//!
//! This module handles:
//! - Shareable content enumeration and selection
//! - The capture stream lifecycle with bounded buffering
//! - Forwarding captured frames to the preview and the publisher
//! - The xdg-desktop-portal / PipeWire backend

pub mod content;
pub mod manager;
pub mod platform;
pub mod portal;
pub mod share;
pub mod stream;

pub use content::{
    filter_windows, ContentCatalog, DisplayInfo, RunningApplication, ShareableContent, WindowInfo,
};
pub use manager::{CaptureManager, CaptureState, UpdateKind};
pub use platform::{CapturePlatform, FrameSink, FrameStream, PlatformStream, SinkStats, SinkStatus};
pub use portal::PortalPlatform;
pub use share::{ScreenShare, ShareStats, SizeTracker};
pub use stream::PipeWireStream;
