//! Screen share forwarding loop
//!
//! Reads captured frames, paints each one on the local preview and, while
//! the publisher is using an injected source, hands it to the pipeline.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::capture::FrameStream;
use crate::pipeline::{Delivery, FrameDeliveryPipeline, RenderTarget};
use crate::types::FrameSize;

/// Detects changes in captured content size
#[derive(Debug, Default, Clone, Copy)]
pub struct SizeTracker {
    current: Option<FrameSize>,
}

impl SizeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `size`; returns it if it differs from the previous one
    pub fn observe(&mut self, size: FrameSize) -> Option<FrameSize> {
        if self.current == Some(size) {
            return None;
        }
        self.current = Some(size);
        Some(size)
    }

    pub fn current(&self) -> Option<FrameSize> {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// Counters of a finished share loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShareStats {
    /// Frames read from the capture stream
    pub frames: u64,
    /// Frames the transport accepted
    pub injected: u64,
    /// Content size changes seen
    pub size_changes: u64,
}

type SizeCallback = Box<dyn FnMut(FrameSize) + Send>;

/// Forwards a capture stream to the preview and the publisher
pub struct ScreenShare {
    preview: Arc<dyn RenderTarget>,
    pipeline: Arc<FrameDeliveryPipeline>,
    on_size_change: Option<SizeCallback>,
}

impl ScreenShare {
    pub fn new(preview: Arc<dyn RenderTarget>, pipeline: Arc<FrameDeliveryPipeline>) -> Self {
        Self {
            preview,
            pipeline,
            on_size_change: None,
        }
    }

    /// Call `f` whenever the captured content changes size
    pub fn on_size_change(mut self, f: impl FnMut(FrameSize) + Send + 'static) -> Self {
        self.on_size_change = Some(Box::new(f));
        self
    }

    /// Run on the current tokio runtime
    pub fn spawn(self, frames: FrameStream) -> JoinHandle<ShareStats> {
        tokio::spawn(self.run(frames))
    }

    /// Consume `frames` until capture stops
    pub async fn run(mut self, mut frames: FrameStream) -> ShareStats {
        let mut sizes = SizeTracker::new();
        let mut stats = ShareStats::default();
        debug!("Screen share loop started");

        while let Some(frame) = frames.next_frame().await {
            stats.frames += 1;

            if let Some(size) = sizes.observe(frame.size) {
                debug!("Captured content size is now {}x{}", size.width, size.height);
                stats.size_changes += 1;
                if let Some(callback) = self.on_size_change.as_mut() {
                    callback(size);
                }
            }

            self.preview.draw_frame(frame.buffer.clone());

            if self.pipeline.active_source().is_injected() {
                if self.pipeline.consume_frame(frame.buffer) == Delivery::Injected {
                    stats.injected += 1;
                }
            } else {
                trace!("Publisher not injected, frame used for preview only");
            }
        }

        info!(
            "Screen share loop ended after {} frames ({} sent)",
            stats.frames, stats.injected
        );
        stats
    }
}
