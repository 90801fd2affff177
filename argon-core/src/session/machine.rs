//! Session state machine
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──SessionConnected──▶ Connected
//!      ▲                                                           │
//!      └──────────────────── SessionDisconnected ◀─────────────────┘
//! ```
//!
//! While connected, publisher and subscriber each carry an independent
//! connected flag. Errors reported by the transport never move the machine;
//! the transport follows up with `SessionDisconnected` when an error is fatal.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{ArgonError, Result, TransportScope};
use crate::pipeline::{Delivery, FrameDeliveryPipeline};
use crate::session::{EventSender, SessionSnapshot, SessionTransport, TransportEvent};
use crate::source::{FrameSource, SourceTransition};
use crate::types::VideoRole;

/// Connection to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// What handling an event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// State was updated
    Applied,
    /// A frame was routed (or dropped) by the pipeline
    Delivered(Delivery),
    /// The publisher's frame source was switched (or the request was stale)
    SourceChanged(SourceTransition),
    /// The session ended; `previous_source` was active at that moment
    SessionEnded { previous_source: FrameSource },
}

/// Tracks the session lifecycle and feeds the frame pipeline
pub struct SessionStateMachine {
    transport: Arc<dyn SessionTransport>,
    pipeline: Arc<FrameDeliveryPipeline>,
    events: EventSender,
    state: ConnectionState,
    session_id: Option<String>,
    publisher_connected: bool,
    subscriber_connected: bool,
    auto_publish: bool,
}

impl SessionStateMachine {
    /// Create a disconnected machine
    ///
    /// `events` is handed to the transport on connect; it must feed the queue
    /// that drives [`handle_event`](Self::handle_event).
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        pipeline: Arc<FrameDeliveryPipeline>,
        events: EventSender,
    ) -> Self {
        Self {
            transport,
            pipeline,
            events,
            state: ConnectionState::Disconnected,
            session_id: None,
            publisher_connected: false,
            subscriber_connected: false,
            auto_publish: true,
        }
    }

    /// Whether to publish as soon as the session connects (default: true)
    pub fn with_auto_publish(mut self, auto_publish: bool) -> Self {
        self.auto_publish = auto_publish;
        self
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current session id, if connected
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether the transport has rendered a publisher frame this session
    pub fn publisher_connected(&self) -> bool {
        self.publisher_connected
    }

    /// Whether a remote stream is subscribed
    pub fn subscriber_connected(&self) -> bool {
        self.subscriber_connected
    }

    /// The publisher's active frame source
    pub fn frame_source(&self) -> FrameSource {
        self.pipeline.active_source().get()
    }

    /// Snapshot for observers
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.state,
            session_id: self.session_id.clone(),
            publisher_connected: self.publisher_connected,
            subscriber_connected: self.subscriber_connected,
            frame_source: self.frame_source(),
        }
    }

    /// Ask the transport to establish a session
    ///
    /// Does nothing while connecting or connected. If the transport refuses
    /// the request the machine stays disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            debug!("Connect requested while {}, ignoring", self.state);
            return Ok(());
        }

        info!("Connecting session");
        self.state = ConnectionState::Connecting;
        if let Err(e) = self.transport.connect(self.events.clone()) {
            self.state = ConnectionState::Disconnected;
            error!("Transport refused connect: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Ask the transport to start sending the local stream
    ///
    /// `publisher_connected` only flips once the transport renders the first
    /// publisher frame.
    pub fn publish(&mut self) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(ArgonError::invalid_state(format!(
                "cannot publish while {}",
                self.state
            )));
        }

        info!("Publishing local stream");
        self.transport.publish().map_err(|e| {
            error!("Transport refused publish: {}", e);
            e
        })
    }

    /// Ask the transport to leave the session
    ///
    /// The machine moves to disconnected when the transport confirms.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Disconnected {
            debug!("Disconnect requested while disconnected, ignoring");
            return Ok(());
        }

        info!("Disconnecting session");
        self.transport.disconnect()
    }

    /// Apply one transport event
    ///
    /// Transport errors are returned as [`ArgonError::Transport`] after the
    /// state has been left untouched.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<EventOutcome> {
        match event {
            TransportEvent::SessionConnected(session_id) => {
                info!("Session connected: {}", session_id);
                self.state = ConnectionState::Connected;
                self.session_id = Some(session_id);
                if self.auto_publish {
                    self.publish()?;
                }
                Ok(EventOutcome::Applied)
            }
            TransportEvent::SessionDisconnected(session_id) => {
                info!("Session disconnected: {}", session_id);
                self.state = ConnectionState::Disconnected;
                self.session_id = None;
                self.publisher_connected = false;
                self.subscriber_connected = false;
                self.pipeline.set_subscriber_connected(false);
                let previous_source = self.pipeline.active_source().reset();
                if previous_source.is_injected() {
                    debug!("Dropped {} with the session", previous_source);
                }
                Ok(EventOutcome::SessionEnded { previous_source })
            }
            TransportEvent::SessionError(message) => {
                error!("Session error: {}", message);
                Err(ArgonError::transport(TransportScope::Session, message))
            }
            TransportEvent::SubscriberError(message) => {
                error!("Subscriber error: {}", message);
                Err(ArgonError::transport(TransportScope::Subscriber, message))
            }
            TransportEvent::PublisherRenderFrame(frame) => {
                if !self.publisher_connected {
                    info!("Publisher is live ({} frames)", frame.size());
                    self.publisher_connected = true;
                }
                Ok(EventOutcome::Delivered(
                    self.pipeline.deliver(VideoRole::Publisher, frame),
                ))
            }
            TransportEvent::SubscriberConnected => {
                info!("Subscriber connected");
                self.subscriber_connected = true;
                self.pipeline.set_subscriber_connected(true);
                Ok(EventOutcome::Applied)
            }
            TransportEvent::SubscriberDisconnected => {
                info!("Subscriber disconnected");
                self.subscriber_connected = false;
                self.pipeline.set_subscriber_connected(false);
                Ok(EventOutcome::Applied)
            }
            TransportEvent::SubscriberRenderFrame(frame) => Ok(EventOutcome::Delivered(
                self.pipeline.deliver(VideoRole::Subscriber, frame),
            )),
            TransportEvent::VideoCapturerStart(handle) => {
                let transition = self.pipeline.active_source().inject(handle);
                match transition {
                    SourceTransition::Changed { from, to } => {
                        info!("Publisher source {} -> {}", from, to)
                    }
                    _ => debug!("Capturer {} already active", handle),
                }
                Ok(EventOutcome::SourceChanged(transition))
            }
            TransportEvent::VideoCapturerDestroy(handle) => {
                let transition = self.pipeline.active_source().restore(handle);
                match transition {
                    SourceTransition::Changed { from, to } => {
                        info!("Publisher source {} -> {}", from, to)
                    }
                    SourceTransition::Stale => {
                        warn!("Ignoring destroy of inactive capturer {}", handle)
                    }
                    SourceTransition::Unchanged => {
                        debug!("Capturer {} destroyed while default source active", handle)
                    }
                }
                Ok(EventOutcome::SourceChanged(transition))
            }
        }
    }
}
