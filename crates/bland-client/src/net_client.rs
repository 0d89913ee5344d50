//! Channel-based network client for the game server.
//!
//! Spawns background reader/writer tasks over any [`Transport`] and exposes
//! channels, so the session loop never owns the socket directly.

use bland_core::error::ProtocolError;
use bland_core::protocol::{ClientMessage, ServerMessage, decode_server_frame};
use tokio::sync::mpsc;

use crate::transport::{Transport, TransportReader, TransportWriter};

/// Events produced by the background reader task.
#[derive(Debug)]
pub enum NetEvent {
    /// A decoded [`ServerMessage`].
    Message(ServerMessage),
    /// A frame that did not decode; dropped, never applied.
    Malformed(ProtocolError),
    /// The server closed the connection cleanly.
    Disconnected,
    /// An I/O error occurred on the connection.
    Error(String),
}

/// Cloneable handle for enqueueing outgoing messages.
#[derive(Debug, Clone)]
pub struct NetSender {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
}

impl NetSender {
    /// Enqueue a [`ClientMessage`]. Fails once the writer task has stopped.
    pub fn send(&self, msg: ClientMessage) -> Result<(), mpsc::error::SendError<ClientMessage>> {
        self.outgoing.send(msg)
    }

    pub fn is_closed(&self) -> bool {
        self.outgoing.is_closed()
    }
}

/// A channel-based network client.
///
/// - [`incoming`](NetClient::incoming) yields [`NetEvent`]s.
/// - [`send`](NetClient::send) enqueues a message without blocking.
pub struct NetClient {
    pub incoming: mpsc::UnboundedReceiver<NetEvent>,
    outgoing: NetSender,
}

impl NetClient {
    /// Split `transport`, spawn the I/O tasks and return the client.
    ///
    /// No handshake is sent; joining is up to the session.
    pub fn from_transport<T: Transport>(transport: T) -> Self {
        let (reader, writer) = transport.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();

        Self::spawn_reader_task(reader, event_tx);
        Self::spawn_writer_task(writer, cmd_rx);

        Self {
            incoming: event_rx,
            outgoing: NetSender { outgoing: cmd_tx },
        }
    }

    pub fn send(&self, msg: ClientMessage) -> Result<(), mpsc::error::SendError<ClientMessage>> {
        self.outgoing.send(msg)
    }

    /// Separate the send side from the event stream.
    pub fn split(self) -> (NetSender, mpsc::UnboundedReceiver<NetEvent>) {
        (self.outgoing, self.incoming)
    }

    fn spawn_reader_task<R: TransportReader>(
        mut reader: R,
        event_tx: mpsc::UnboundedSender<NetEvent>,
    ) {
        tokio::spawn(async move {
            loop {
                let event = match reader.recv().await {
                    Ok(Some(frame)) if frame.trim().is_empty() => continue,
                    Ok(Some(frame)) => match decode_server_frame(&frame) {
                        Ok(msg) => NetEvent::Message(msg),
                        Err(error) => NetEvent::Malformed(error),
                    },
                    Ok(None) => {
                        let _ = event_tx.send(NetEvent::Disconnected);
                        break;
                    }
                    Err(e) => {
                        let _ = event_tx.send(NetEvent::Error(e.to_string()));
                        break;
                    }
                };
                if event_tx.send(event).is_err() {
                    break;
                }
            }
        });
    }

    fn spawn_writer_task<W: TransportWriter>(
        mut writer: W,
        mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    ) {
        tokio::spawn(async move {
            while let Some(msg) = cmd_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(event = msg.event_name(), error = %e, "unserializable message");
                        continue;
                    }
                };
                if writer.send(&json).await.is_err() {
                    break;
                }
            }
        });
    }
}
