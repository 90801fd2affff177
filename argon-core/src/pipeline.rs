//! Frame delivery pipeline
//!
//! Routes every frame to exactly one destination:
//!
//! ```text
//!  transport publisher frame ──▶ [source == Default?] ──▶ publisher view
//!  transport subscriber frame ─▶ [subscriber up?]     ──▶ subscriber view
//!  capture frame ──────────────▶ [source == Injected?] ─▶ transport.consume_frame
//! ```
//!
//! A frame that arrives for a route that is currently closed is discarded.
//! This is expected while the publisher source is switching, so it is counted
//! and logged at trace level rather than reported as an error.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

use crate::session::SessionTransport;
use crate::source::ActiveSource;
use crate::types::{FrameBuffer, VideoRole};

/// A surface that can paint a frame
///
/// The frame is handed over by value; implementations must not keep it after
/// returning.
pub trait RenderTarget: Send + Sync {
    /// Draw a single frame
    fn draw_frame(&self, frame: FrameBuffer);
}

/// Why a frame was not delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A transport publisher frame arrived while injected frames are active
    InjectedSourceActive,
    /// An injected frame arrived while the default source is active
    NotInjected,
    /// A subscriber frame arrived while no subscriber is connected
    SubscriberDisconnected,
    /// The transport refused an injected frame
    TransportRejected,
}

/// Where a frame ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Drawn on the render target of the given role
    Rendered(VideoRole),
    /// Handed to the transport's custom capturer
    Injected,
    /// Discarded
    Dropped(DropReason),
}

impl Delivery {
    pub fn is_dropped(&self) -> bool {
        matches!(self, Delivery::Dropped(_))
    }
}

/// Counters for frames routed through the pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub publisher_rendered: u64,
    pub subscriber_rendered: u64,
    pub injected: u64,
    pub dropped: u64,
}

/// Routes frames from the active source to their render target
pub struct FrameDeliveryPipeline {
    publisher_view: Arc<dyn RenderTarget>,
    subscriber_view: Arc<dyn RenderTarget>,
    transport: Arc<dyn SessionTransport>,
    active_source: Arc<ActiveSource>,
    subscriber_connected: AtomicBool,
    publisher_rendered: AtomicU64,
    subscriber_rendered: AtomicU64,
    injected: AtomicU64,
    dropped: AtomicU64,
}

impl FrameDeliveryPipeline {
    /// Create a pipeline drawing into the given views
    pub fn new(
        publisher_view: Arc<dyn RenderTarget>,
        subscriber_view: Arc<dyn RenderTarget>,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        Self {
            publisher_view,
            subscriber_view,
            transport,
            active_source: Arc::new(ActiveSource::new()),
            subscriber_connected: AtomicBool::new(false),
            publisher_rendered: AtomicU64::new(0),
            subscriber_rendered: AtomicU64::new(0),
            injected: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// The publisher's active source cell
    pub fn active_source(&self) -> &Arc<ActiveSource> {
        &self.active_source
    }

    /// Whether subscriber frames are currently accepted
    pub fn subscriber_connected(&self) -> bool {
        self.subscriber_connected.load(Ordering::Acquire)
    }

    /// Open or close the subscriber route
    ///
    /// Only the session state machine calls this.
    pub(crate) fn set_subscriber_connected(&self, connected: bool) {
        self.subscriber_connected.store(connected, Ordering::Release);
    }

    /// Deliver a transport-provided frame for `role`
    pub fn deliver(&self, role: VideoRole, frame: FrameBuffer) -> Delivery {
        match role {
            VideoRole::Publisher => {
                if self.active_source.is_injected() {
                    return self.drop_frame(role, DropReason::InjectedSourceActive);
                }
                self.publisher_view.draw_frame(frame);
                self.publisher_rendered.fetch_add(1, Ordering::Relaxed);
                Delivery::Rendered(role)
            }
            VideoRole::Subscriber => {
                if !self.subscriber_connected() {
                    return self.drop_frame(role, DropReason::SubscriberDisconnected);
                }
                self.subscriber_view.draw_frame(frame);
                self.subscriber_rendered.fetch_add(1, Ordering::Relaxed);
                Delivery::Rendered(role)
            }
        }
    }

    /// Push an externally captured frame into the publisher
    ///
    /// Accepted only while an injected source is active.
    pub fn consume_frame(&self, frame: FrameBuffer) -> Delivery {
        if !self.active_source.is_injected() {
            return self.drop_frame(VideoRole::Publisher, DropReason::NotInjected);
        }

        match self.transport.consume_frame(frame) {
            Ok(()) => {
                let count = self.injected.fetch_add(1, Ordering::Relaxed);
                if count % 60 == 0 {
                    trace!("Injected {} frames into publisher", count + 1);
                }
                Delivery::Injected
            }
            Err(e) => {
                warn!("Transport rejected injected frame: {}", e);
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped(DropReason::TransportRejected)
            }
        }
    }

    /// Snapshot of the delivery counters
    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            publisher_rendered: self.publisher_rendered.load(Ordering::Relaxed),
            subscriber_rendered: self.subscriber_rendered.load(Ordering::Relaxed),
            injected: self.injected.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn drop_frame(&self, role: VideoRole, reason: DropReason) -> Delivery {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        trace!("Dropping {} frame: {:?}", role, reason);
        Delivery::Dropped(reason)
    }
}
