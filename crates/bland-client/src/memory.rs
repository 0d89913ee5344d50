//! In-process transport, for driving the client without a socket.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::transport::{Connector, Transport, TransportError, TransportReader, TransportWriter};

/// One end of an in-memory text channel.
pub struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl MemoryTransport {
    /// Two connected ends. Dropping one closes the other's read half.
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            Self {
                inbound: a_rx,
                outbound: b_tx,
            },
            Self {
                inbound: b_rx,
                outbound: a_tx,
            },
        )
    }

    /// Next frame sent by the other end, or `None` once it is gone.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Returns `false` if the other end is gone.
    pub fn send_text(&self, text: &str) -> bool {
        self.outbound.send(text.to_string()).is_ok()
    }
}

impl Transport for MemoryTransport {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (
            MemoryReader {
                inbound: self.inbound,
            },
            MemoryWriter {
                outbound: self.outbound,
            },
        )
    }
}

pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<String>,
}

impl TransportReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.recv().await)
    }
}

pub struct MemoryWriter {
    outbound: mpsc::UnboundedSender<String>,
}

impl TransportWriter for MemoryWriter {
    async fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.outbound
            .send(text.to_string())
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

/// Hands out queued client ends, one per connection attempt.
///
/// An attempt made while the queue is empty fails, like a refused dial.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    pending: Arc<Mutex<VecDeque<MemoryTransport>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connection and return the server's end of it.
    pub async fn accept_next(&self) -> MemoryTransport {
        let (client, server) = MemoryTransport::pair();
        self.pending.lock().await.push_back(client);
        server
    }
}

impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&self) -> Result<MemoryTransport, TransportError> {
        self.pending
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| TransportError::Io("connection refused".to_string()))
    }
}
