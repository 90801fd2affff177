//! Publisher frame sources
//!
//! The publisher is fed by exactly one source at a time: the transport's own
//! camera capturer, or frames injected from outside (screen capture). The
//! active source lives in a single atomic word so that the session runner can
//! switch it while the capture loop reads it from another task.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::CapturerHandle;

/// Where publisher frames come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrameSource {
    /// The transport's built-in camera capturer
    #[default]
    Default,
    /// Externally pushed frames, accepted by the given custom capturer
    Injected(CapturerHandle),
}

impl FrameSource {
    fn to_raw(self) -> u64 {
        match self {
            FrameSource::Default => 0,
            FrameSource::Injected(handle) => handle.as_u64(),
        }
    }

    fn from_raw(raw: u64) -> Self {
        if raw == 0 {
            FrameSource::Default
        } else {
            FrameSource::Injected(CapturerHandle::from_raw(raw))
        }
    }

    /// Whether frames must be pushed from outside the transport
    pub fn is_injected(&self) -> bool {
        matches!(self, FrameSource::Injected(_))
    }
}

impl std::fmt::Display for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameSource::Default => write!(f, "default"),
            FrameSource::Injected(handle) => write!(f, "injected({})", handle),
        }
    }
}

/// Outcome of an attempted source switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceTransition {
    /// The active source changed
    Changed { from: FrameSource, to: FrameSource },
    /// The requested source was already active
    Unchanged,
    /// The request referred to a capturer that is no longer active
    Stale,
}

/// Atomic cell holding the publisher's active frame source
#[derive(Debug, Default)]
pub struct ActiveSource {
    raw: AtomicU64,
}

impl ActiveSource {
    /// Create a cell with the default source active
    pub fn new() -> Self {
        Self {
            raw: AtomicU64::new(0),
        }
    }

    /// Current active source
    pub fn get(&self) -> FrameSource {
        FrameSource::from_raw(self.raw.load(Ordering::Acquire))
    }

    /// Whether injected frames are currently expected
    pub fn is_injected(&self) -> bool {
        self.get().is_injected()
    }

    /// Switch to injected frames from `handle`
    ///
    /// A newer capturer supersedes an older one that was never destroyed.
    pub fn inject(&self, handle: CapturerHandle) -> SourceTransition {
        let to = FrameSource::Injected(handle);
        let previous = self.raw.swap(to.to_raw(), Ordering::AcqRel);
        let from = FrameSource::from_raw(previous);
        if from == to {
            SourceTransition::Unchanged
        } else {
            SourceTransition::Changed { from, to }
        }
    }

    /// Switch back to the default source if `handle` is the active capturer
    pub fn restore(&self, handle: CapturerHandle) -> SourceTransition {
        let expected = FrameSource::Injected(handle).to_raw();
        match self
            .raw
            .compare_exchange(expected, 0, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => SourceTransition::Changed {
                from: FrameSource::Injected(handle),
                to: FrameSource::Default,
            },
            Err(0) => SourceTransition::Unchanged,
            Err(_) => SourceTransition::Stale,
        }
    }

    /// Unconditionally switch back to the default source
    ///
    /// Returns the source that was active before.
    pub fn reset(&self) -> FrameSource {
        FrameSource::from_raw(self.raw.swap(0, Ordering::AcqRel))
    }
}
