//! The session's view of the channel to the server.
//!
//! A [`TransportLink`] only has to open the channel and accept outgoing
//! messages. Lifecycle events (`open`, `close`, inbound messages) are pushed
//! into the [`SessionResyncHandler`](crate::resync::SessionResyncHandler) by
//! whoever drives the link.

use crate::protocol::ClientMessage;

/// What happened to a message handed to [`TransportLink::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the open channel. Not yet acknowledged by the server.
    Sent,
    /// The channel was not open; the message is gone.
    Dropped,
}

/// Bidirectional message channel to the server.
pub trait TransportLink {
    /// Open the channel. Must be a no-op while already open or opening.
    fn connect(&mut self);

    fn is_open(&self) -> bool;

    /// Best-effort send. Never fails loudly; callers wait for the server's
    /// acknowledgment event before assuming delivery.
    fn send(&mut self, msg: &ClientMessage) -> Delivery;
}
