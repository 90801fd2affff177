//! Session lifecycle against the remote transport
//!
//! The transport is an opaque collaborator: it is driven through the
//! [`SessionTransport`] trait and reports back through [`TransportEvent`]s.
//! All events and user commands go through one ordered queue which a single
//! [`SessionRunner`] task drains, so session state has exactly one writer.

mod events;
mod loopback;
mod machine;
mod runner;
mod transport;

pub use events::{
    EventSender, SessionAlert, SessionCommand, SessionMessage, SessionSnapshot, TransportEvent,
};
pub use loopback::{LoopbackConfig, LoopbackTransport};
pub use machine::{ConnectionState, EventOutcome, SessionStateMachine};
pub use runner::{SessionHandle, SessionRunner};
pub use transport::SessionTransport;
