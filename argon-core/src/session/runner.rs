//! Session runner task
//!
//! Owns the [`SessionStateMachine`] and drains the session queue in order.
//! Observers get state through a `watch` channel and errors through a
//! `broadcast` channel; nothing outside this task mutates session state.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::capture::{CaptureManager, CaptureState};
use crate::config::SessionConfig;
use crate::error::{ArgonError, Result, TransportScope};
use crate::pipeline::FrameDeliveryPipeline;
use crate::session::{
    EventOutcome, EventSender, SessionAlert, SessionCommand, SessionMessage, SessionSnapshot,
    SessionStateMachine, SessionTransport,
};

/// Drives the session state machine from the ordered session queue
pub struct SessionRunner {
    machine: SessionStateMachine,
    rx: mpsc::UnboundedReceiver<SessionMessage>,
    state_tx: watch::Sender<SessionSnapshot>,
    alerts: broadcast::Sender<SessionAlert>,
    capture: Option<Arc<CaptureManager>>,
}

impl SessionRunner {
    /// Create a runner and the handle used to talk to it
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        pipeline: Arc<FrameDeliveryPipeline>,
        config: &SessionConfig,
    ) -> (Self, SessionHandle) {
        let (events, rx) = EventSender::channel();
        let machine = SessionStateMachine::new(transport, pipeline, events.clone())
            .with_auto_publish(config.auto_publish);
        let (state_tx, state_rx) = watch::channel(machine.snapshot());
        let (alerts, _) = broadcast::channel(16);

        let handle = SessionHandle {
            events,
            state_rx,
            alerts: alerts.clone(),
        };

        let runner = Self {
            machine,
            rx,
            state_tx,
            alerts,
            capture: None,
        };
        (runner, handle)
    }

    /// Stop this capture manager whenever the session ends
    pub fn with_capture(mut self, capture: Arc<CaptureManager>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Run on the current tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process messages until shutdown or until every sender is gone
    pub async fn run(mut self) {
        debug!("Session runner started");
        while let Some(message) = self.rx.recv().await {
            let keep_running = self.dispatch(message).await;
            self.publish_snapshot();
            if !keep_running {
                break;
            }
        }
        info!("Session runner stopped");
    }

    async fn dispatch(&mut self, message: SessionMessage) -> bool {
        match message {
            SessionMessage::Event(event) => {
                trace!("Session event: {}", event.name());
                let scope = event.scope();
                match self.machine.handle_event(event) {
                    Ok(EventOutcome::SessionEnded { .. }) => self.on_session_ended(),
                    Ok(_) => {}
                    Err(e) => self.raise(&e, scope),
                }
                true
            }
            SessionMessage::Command { command, reply } => {
                debug!("Session command: {:?}", command);
                let result = match command {
                    SessionCommand::Connect => self.machine.connect(),
                    SessionCommand::Publish => self.machine.publish(),
                    SessionCommand::Disconnect => self.machine.disconnect(),
                    SessionCommand::Shutdown => Ok(()),
                };
                if let Err(e) = &result {
                    self.raise(e, command.scope());
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
                command != SessionCommand::Shutdown
            }
        }
    }

    fn on_session_ended(&mut self) {
        if let Some(capture) = &self.capture {
            // A capture still starting is stopped once its start completes;
            // stop queues behind it without holding up the session queue
            if capture.state() != CaptureState::Idle {
                info!("Session ended, stopping screen capture");
            }
            let capture = capture.clone();
            tokio::spawn(async move {
                if let Err(e) = capture.stop().await {
                    warn!("Failed to stop capture after session end: {}", e);
                }
            });
        }

        let session_id = self.state_tx.borrow().session_id.clone().unwrap_or_default();
        let _ = self.alerts.send(SessionAlert::Ended { session_id });
    }

    /// Report a failure; non-transport errors take the scope of what failed
    fn raise(&self, err: &ArgonError, fallback: TransportScope) {
        let scope = match err {
            ArgonError::Transport { scope, .. } => *scope,
            _ => fallback,
        };
        let message = match err {
            ArgonError::Transport { message, .. } => message.clone(),
            other => other.to_string(),
        };
        error!("Session {} error: {}", scope, message);
        // No receivers is fine
        let _ = self.alerts.send(SessionAlert::Error { scope, message });
    }

    fn publish_snapshot(&self) {
        let snapshot = self.machine.snapshot();
        self.state_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Cloneable front end of a running session
#[derive(Clone)]
pub struct SessionHandle {
    events: EventSender,
    state_rx: watch::Receiver<SessionSnapshot>,
    alerts: broadcast::Sender<SessionAlert>,
}

impl SessionHandle {
    /// Sender the transport reports on
    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    /// Establish the session
    pub async fn connect(&self) -> Result<()> {
        self.send(SessionCommand::Connect).await
    }

    /// Start publishing (normally automatic after connect)
    pub async fn publish(&self) -> Result<()> {
        self.send(SessionCommand::Publish).await
    }

    /// Leave the session
    pub async fn disconnect(&self) -> Result<()> {
        self.send(SessionCommand::Disconnect).await
    }

    /// Stop the runner task
    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_rx.borrow().clone()
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_rx.clone()
    }

    /// Receive errors and session-end notices
    pub fn alerts(&self) -> broadcast::Receiver<SessionAlert> {
        self.alerts.subscribe()
    }

    /// Wait until the session is connected and return its id
    ///
    /// Dropping the returned future cancels the wait.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<String> {
        let snapshot = self
            .wait_until(timeout, |s| {
                s.connection == crate::session::ConnectionState::Connected
            })
            .await?;
        Ok(snapshot.session_id.unwrap_or_default())
    }

    /// Wait until `predicate` holds for the published state
    pub async fn wait_until(
        &self,
        timeout: Duration,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot> {
        let mut rx = self.state_rx.clone();
        match tokio::time::timeout(timeout, rx.wait_for(predicate)).await {
            Ok(Ok(snapshot)) => Ok(snapshot.clone()),
            Ok(Err(_)) => Err(ArgonError::invalid_state("session runner stopped")),
            Err(_) => Err(ArgonError::transport(
                TransportScope::Session,
                format!("timed out after {:?}", timeout),
            )),
        }
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        let reply = self
            .events
            .command(command)
            .ok_or_else(|| ArgonError::invalid_state("session runner stopped"))?;
        reply
            .await
            .map_err(|_| ArgonError::invalid_state("session runner dropped the request"))?
    }
}
