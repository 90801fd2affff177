//! Argon Core Library
//!
//! Desktop call orchestration with screen sharing.
//!
//! This library provides:
//! - A session state machine driven by an opaque transport
//! - Frame routing between the camera, screen capture and render targets
//! - Screen capture via xdg-desktop-portal and PipeWire with bounded buffering
//! - Default audio output tracking
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐ events ┌────────────────┐      ┌────────────────────┐
//! │  Transport  │───────▶│ Session Runner │─────▶│ Delivery Pipeline  │──▶ views
//! └─────────────┘        └────────────────┘      └────────────────────┘
//!        ▲                                                 ▲
//!        │ consume_frame  ┌─────────────────┐  frames      │
//!        └────────────────│ Capture Manager │──────────────┘
//!                         │ (PipeWire In)   │──▶ preview
//!                         └─────────────────┘
//! ```

pub mod audio;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod types;

pub use config::{CaptureConfiguration, CaptureKind, ConfigFile, ContentFilter, Preset};
pub use controller::{Controller, ControllerParts};
pub use error::{ArgonError, Result};
pub use pipeline::{FrameDeliveryPipeline, RenderTarget};
pub use source::{ActiveSource, FrameSource};
pub use types::{CapturedFrame, CapturerHandle, FrameBuffer, FrameSize, VideoRole};
