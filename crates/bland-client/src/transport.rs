//! Transport abstraction for network communication.
//!
//! Decouples the networking layer from any specific transport.
//! [`NetClient`](crate::net_client::NetClient) works over any [`Transport`],
//! and a [`Connector`] opens a fresh one for every connection attempt.

use std::future::Future;

use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O or protocol-level error.
    #[error("{0}")]
    Io(String),

    /// Opening the connection took too long.
    #[error("connection attempt timed out")]
    TimedOut,
}

/// Read half of a transport connection.
pub trait TransportReader: Send + 'static {
    /// Receive the next text frame.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(&mut self) -> impl Future<Output = Result<Option<String>, TransportError>> + Send;
}

/// Write half of a transport connection.
pub trait TransportWriter: Send + 'static {
    /// Send a text frame to the remote peer.
    fn send(&mut self, text: &str) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// A bidirectional transport that can be split into independent read and write
/// halves, so each can live in its own task.
pub trait Transport: Send + 'static {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Opens new connections to the game server.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(&self) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}
