//! Reconnecting [`TransportLink`] over a [`Connector`].
//!
//! Every call to [`connect`](TransportLink::connect) opens a new connection
//! generation in a background task. Lifecycle events come back through a
//! channel as [`LinkEvent`]s tagged with their generation, so the event loop
//! can drop anything that belongs to a connection it already gave up on.

use std::sync::Arc;
use std::time::Duration;

use bland_core::error::ProtocolError;
use bland_core::link::{Delivery, TransportLink};
use bland_core::protocol::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;

use crate::net_client::{NetClient, NetEvent, NetSender};
use crate::transport::{Connector, TransportError};

/// Connection lifecycle, as reported to the event loop.
#[derive(Debug)]
pub enum LinkEvent {
    Opened {
        generation: u64,
        sender: NetSender,
    },
    Message {
        generation: u64,
        msg: ServerMessage,
    },
    Malformed {
        generation: u64,
        error: ProtocolError,
    },
    /// The connection closed, or the attempt to open it failed.
    Closed {
        generation: u64,
        reason: String,
    },
}

impl LinkEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LinkEvent::Opened { generation, .. }
            | LinkEvent::Message { generation, .. }
            | LinkEvent::Malformed { generation, .. }
            | LinkEvent::Closed { generation, .. } => *generation,
        }
    }
}

/// The session's single channel to the server.
pub struct WsLink<C> {
    connector: Arc<C>,
    events: mpsc::UnboundedSender<LinkEvent>,
    connect_timeout: Duration,
    generation: u64,
    connecting: bool,
    sender: Option<NetSender>,
}

impl<C: Connector> WsLink<C> {
    pub fn new(
        connector: C,
        events: mpsc::UnboundedSender<LinkEvent>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector: Arc::new(connector),
            events,
            connect_timeout,
            generation: 0,
            connecting: false,
            sender: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Adopt the sender of a freshly opened connection.
    ///
    /// Returns `false` for a connection from an older generation.
    pub fn attach(&mut self, generation: u64, sender: NetSender) -> bool {
        if !self.is_current(generation) {
            tracing::debug!(generation, current = self.generation, "dropping stale connection");
            return false;
        }
        self.connecting = false;
        self.sender = Some(sender);
        true
    }

    /// Forget the current connection after it closed.
    ///
    /// Returns `false` for a close from an older generation.
    pub fn detach(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.connecting = false;
        self.sender = None;
        true
    }
}

impl<C: Connector> TransportLink for WsLink<C> {
    fn connect(&mut self) {
        if self.sender.is_some() || self.connecting {
            return;
        }
        self.generation += 1;
        self.connecting = true;

        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let events = self.events.clone();
        let timeout = self.connect_timeout;
        tokio::spawn(async move {
            let transport = match tokio::time::timeout(timeout, connector.connect()).await {
                Ok(Ok(transport)) => transport,
                Ok(Err(e)) => {
                    let _ = events.send(LinkEvent::Closed {
                        generation,
                        reason: e.to_string(),
                    });
                    return;
                }
                Err(_) => {
                    let _ = events.send(LinkEvent::Closed {
                        generation,
                        reason: TransportError::TimedOut.to_string(),
                    });
                    return;
                }
            };

            let (sender, mut incoming) = NetClient::from_transport(transport).split();
            if events.send(LinkEvent::Opened { generation, sender }).is_err() {
                return;
            }
            while let Some(event) = incoming.recv().await {
                let event = match event {
                    NetEvent::Message(msg) => LinkEvent::Message { generation, msg },
                    NetEvent::Malformed(error) => LinkEvent::Malformed { generation, error },
                    NetEvent::Disconnected => LinkEvent::Closed {
                        generation,
                        reason: TransportError::ConnectionClosed.to_string(),
                    },
                    NetEvent::Error(reason) => LinkEvent::Closed { generation, reason },
                };
                let closed = matches!(event, LinkEvent::Closed { .. });
                if events.send(event).is_err() || closed {
                    break;
                }
            }
        });
    }

    fn is_open(&self) -> bool {
        self.sender.as_ref().is_some_and(|s| !s.is_closed())
    }

    fn send(&mut self, msg: &ClientMessage) -> Delivery {
        match &self.sender {
            Some(sender) if sender.send(msg.clone()).is_ok() => Delivery::Sent,
            _ => Delivery::Dropped,
        }
    }
}
