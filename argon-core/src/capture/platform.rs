//! Capture platform seam and the bounded frame channel between a platform
//! stream and its consumer

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::trace;

use crate::capture::ShareableContent;
use crate::config::{CaptureConfiguration, ContentFilter};
use crate::error::Result;
use crate::types::CapturedFrame;

/// Screen capture provider
#[async_trait]
pub trait CapturePlatform: Send + Sync {
    /// Enumerate what may be captured
    ///
    /// Fails with `PermissionDenied` when the user has not authorized
    /// screen capture.
    async fn shareable_content(&self) -> Result<ShareableContent>;

    /// Open a stream for `config`, feeding frames into `sink`
    async fn open_stream(
        &self,
        config: &CaptureConfiguration,
        sink: FrameSink,
    ) -> Result<Box<dyn PlatformStream>>;
}

/// A running platform capture stream
#[async_trait]
pub trait PlatformStream: Send {
    /// Apply new output properties without tearing the stream down
    async fn update_configuration(&mut self, config: &CaptureConfiguration) -> Result<()>;

    /// Change what is captured within the same display or window
    async fn update_content_filter(&mut self, filter: &ContentFilter) -> Result<()>;

    /// Stop producing frames and release platform resources
    async fn stop(&mut self) -> Result<()>;
}

/// Result of offering a frame to a [`FrameSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// Queued for the consumer
    Accepted,
    /// Arrived before the configured frame interval elapsed
    Throttled,
    /// Consumer has `queue_depth` frames pending; producer must wait
    Backpressure,
    /// Consumer is gone or capture was stopped
    Closed,
}

/// Counters shared by a sink and its stream
#[derive(Debug, Default)]
struct SinkCounters {
    accepted: AtomicU64,
    throttled: AtomicU64,
    backpressured: AtomicU64,
}

/// Snapshot of a sink's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub accepted: u64,
    pub throttled: u64,
    pub backpressured: u64,
}

/// Producer half of the bounded frame channel
///
/// Holds at most `queue_depth` frames the consumer has not taken yet and
/// enforces the configured frame interval. Cheap to clone.
#[derive(Clone)]
pub struct FrameSink {
    tx: mpsc::Sender<CapturedFrame>,
    min_interval_nanos: Arc<AtomicU64>,
    last_accepted: Arc<Mutex<Option<Instant>>>,
    cancelled: Arc<AtomicBool>,
    counters: Arc<SinkCounters>,
}

impl FrameSink {
    /// Create a sink/stream pair holding at most `queue_depth` frames
    pub fn channel(queue_depth: u32, min_interval: Duration) -> (FrameSink, FrameStream) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1) as usize);
        let cancelled = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(SinkCounters::default());

        let sink = FrameSink {
            tx,
            min_interval_nanos: Arc::new(AtomicU64::new(min_interval.as_nanos() as u64)),
            last_accepted: Arc::new(Mutex::new(None)),
            cancelled: cancelled.clone(),
            counters: counters.clone(),
        };
        let stream = FrameStream {
            rx,
            cancelled,
            counters,
        };
        (sink, stream)
    }

    /// Offer a frame without waiting
    ///
    /// Real-time producers call this from their delivery callback and hand
    /// the buffer back to the platform on anything but `Accepted`.
    pub fn try_send(&self, frame: CapturedFrame) -> SinkStatus {
        if self.is_closed() {
            return SinkStatus::Closed;
        }

        let now = Instant::now();
        let mut last = self.last_accepted.lock();
        if let Some(prev) = *last {
            if now.duration_since(prev) < self.min_interval() {
                self.counters.throttled.fetch_add(1, Ordering::Relaxed);
                return SinkStatus::Throttled;
            }
        }

        match self.tx.try_send(frame) {
            Ok(()) => {
                *last = Some(now);
                self.accepted();
                SinkStatus::Accepted
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let count = self.counters.backpressured.fetch_add(1, Ordering::Relaxed) + 1;
                if count % 60 == 1 {
                    trace!("Frame queue full, producer held back ({} times)", count);
                }
                SinkStatus::Backpressure
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SinkStatus::Closed,
        }
    }

    /// Send a frame, pausing until the interval has elapsed and the consumer
    /// has room
    pub async fn send(&self, frame: CapturedFrame) -> SinkStatus {
        if self.is_closed() {
            return SinkStatus::Closed;
        }

        let wait = {
            let last = self.last_accepted.lock();
            last.and_then(|prev| {
                let elapsed = prev.elapsed();
                self.min_interval().checked_sub(elapsed)
            })
        };
        if let Some(wait) = wait {
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }

        let permit = match self.tx.reserve().await {
            Ok(permit) => permit,
            Err(_) => return SinkStatus::Closed,
        };
        if self.is_closed() {
            return SinkStatus::Closed;
        }
        permit.send(frame);
        *self.last_accepted.lock() = Some(Instant::now());
        self.accepted();
        SinkStatus::Accepted
    }

    /// Whether the consumer can take another frame right now
    pub fn has_capacity(&self) -> bool {
        self.tx.capacity() > 0
    }

    /// Whether frames sent now would be discarded
    pub fn is_closed(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Change the rate cap in place
    pub fn set_min_interval(&self, interval: Duration) {
        self.min_interval_nanos
            .store(interval.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_nanos(self.min_interval_nanos.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
            backpressured: self.counters.backpressured.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn accepted(&self) {
        let count = self.counters.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 60 == 0 {
            trace!("Captured {} frames", count);
        }
    }
}

/// Consumer half: the lazy, cancellable sequence of captured frames
///
/// Survives in-place updates and platform stream restarts. Ends once capture
/// is stopped; frames still queued at that point are discarded.
pub struct FrameStream {
    rx: mpsc::Receiver<CapturedFrame>,
    cancelled: Arc<AtomicBool>,
    counters: Arc<SinkCounters>,
}

impl FrameStream {
    /// Wait for the next frame; `None` once capture has stopped
    pub async fn next_frame(&mut self) -> Option<CapturedFrame> {
        if self.is_cancelled() {
            return None;
        }
        let frame = self.rx.recv().await?;
        // stop() may have run while we were suspended
        if self.is_cancelled() {
            return None;
        }
        Some(frame)
    }

    /// Frames waiting to be taken
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
            backpressured: self.counters.backpressured.load(Ordering::Relaxed),
        }
    }
}

impl Stream for FrameStream {
    type Item = CapturedFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.is_cancelled() {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(_)) if self.is_cancelled() => Poll::Ready(None),
            other => other,
        }
    }
}
