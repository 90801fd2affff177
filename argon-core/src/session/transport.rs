//! Session transport collaborator

use crate::error::Result;
use crate::session::EventSender;
use crate::types::FrameBuffer;

/// A signaling/media transport
///
/// Calls only request work; outcomes come back asynchronously as
/// [`TransportEvent`](crate::session::TransportEvent)s on the sender passed to
/// [`connect`](SessionTransport::connect). Implementations must emit events in
/// the order they happen and must not block the caller.
pub trait SessionTransport: Send + Sync {
    /// Start establishing a session, reporting progress on `events`
    fn connect(&self, events: EventSender) -> Result<()>;

    /// Leave the session
    ///
    /// The transport confirms with `SessionDisconnected`.
    fn disconnect(&self) -> Result<()>;

    /// Start sending the local stream
    fn publish(&self) -> Result<()>;

    /// Push a frame into the publisher's custom capturer
    fn consume_frame(&self, frame: FrameBuffer) -> Result<()>;
}
