//! Transport events and the session message queue

use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, TransportScope};
use crate::session::ConnectionState;
use crate::source::FrameSource;
use crate::types::{CapturerHandle, FrameBuffer};

/// Everything the transport can report
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The session is established
    SessionConnected(String),
    /// The session ended
    SessionDisconnected(String),
    /// Session-level error
    SessionError(String),
    /// The transport rendered a local (publisher) frame
    PublisherRenderFrame(FrameBuffer),
    /// A remote stream was subscribed
    SubscriberConnected,
    /// A remote (subscriber) frame is ready
    SubscriberRenderFrame(FrameBuffer),
    /// The remote stream went away
    SubscriberDisconnected,
    /// Subscriber-level error
    SubscriberError(String),
    /// The publisher switched to a custom capturer expecting pushed frames
    VideoCapturerStart(CapturerHandle),
    /// The custom capturer was destroyed
    VideoCapturerDestroy(CapturerHandle),
}

impl TransportEvent {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionConnected(_) => "session-connected",
            Self::SessionDisconnected(_) => "session-disconnected",
            Self::SessionError(_) => "session-error",
            Self::PublisherRenderFrame(_) => "publisher-frame",
            Self::SubscriberConnected => "subscriber-connected",
            Self::SubscriberRenderFrame(_) => "subscriber-frame",
            Self::SubscriberDisconnected => "subscriber-disconnected",
            Self::SubscriberError(_) => "subscriber-error",
            Self::VideoCapturerStart(_) => "capturer-start",
            Self::VideoCapturerDestroy(_) => "capturer-destroy",
        }
    }

    /// Side of the call this event concerns
    pub fn scope(&self) -> TransportScope {
        match self {
            Self::PublisherRenderFrame(_)
            | Self::VideoCapturerStart(_)
            | Self::VideoCapturerDestroy(_) => TransportScope::Publisher,
            Self::SubscriberConnected
            | Self::SubscriberRenderFrame(_)
            | Self::SubscriberDisconnected
            | Self::SubscriberError(_) => TransportScope::Subscriber,
            _ => TransportScope::Session,
        }
    }
}

/// User requests processed by the session runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Establish the session
    Connect,
    /// Start publishing the local stream
    Publish,
    /// Leave the session
    Disconnect,
    /// Stop the runner
    Shutdown,
}

impl SessionCommand {
    /// Scope failures of this command are reported under
    pub fn scope(&self) -> TransportScope {
        match self {
            Self::Publish => TransportScope::Publisher,
            Self::Connect | Self::Disconnect | Self::Shutdown => TransportScope::Session,
        }
    }
}

/// One entry of the session queue
#[derive(Debug)]
pub enum SessionMessage {
    /// Reported by the transport
    Event(TransportEvent),
    /// Requested by the user
    Command {
        command: SessionCommand,
        reply: Option<oneshot::Sender<Result<()>>>,
    },
}

/// Cloneable sending half of the session queue
///
/// Sending never blocks, so it is safe to call from transport callback
/// threads. Messages are processed in the order they were sent.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<SessionMessage>,
}

impl EventSender {
    /// Create a queue
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a transport event
    ///
    /// Returns false once the runner has shut down.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send(SessionMessage::Event(event)).is_ok()
    }

    /// Queue a command and return a receiver for its result
    pub fn command(&self, command: SessionCommand) -> Option<oneshot::Receiver<Result<()>>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionMessage::Command {
                command,
                reply: Some(reply),
            })
            .ok()
            .map(|_| rx)
    }

    /// Whether the runner is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Point-in-time view of the session, published to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub session_id: Option<String>,
    pub publisher_connected: bool,
    pub subscriber_connected: bool,
    pub frame_source: FrameSource,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            session_id: None,
            publisher_connected: false,
            subscriber_connected: false,
            frame_source: FrameSource::Default,
        }
    }
}

/// Noteworthy session events surfaced to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAlert {
    /// A non-fatal error reported by the transport or a failed command
    Error {
        scope: TransportScope,
        message: String,
    },
    /// The session ended and all session-scoped resources were released
    Ended { session_id: String },
}
