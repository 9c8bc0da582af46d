//! In-process transport: a port pair per channel over tokio mpsc.
//!
//! The requesting side holds a [`LocalTransport`]; the serving side receives
//! each opened channel as a [`RemotePort`] from its [`PortAcceptor`].
//!
//! ```text
//! LocalTransport::open ──RemotePort──▶ PortAcceptor::accept
//!   handle.send(req)   ──────────────▶ port.recv()
//!   events.recv()      ◀────────────── port.respond(resp) / disconnect / drop
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::transport::channel::{ChannelEvent, ChannelHandle, OpenedChannel, Transport, TransportError};
use crate::transport::envelope::{RequestEnvelope, ResponseEnvelope};

/// Create a connected transport/acceptor pair.
pub fn local_transport() -> (LocalTransport, PortAcceptor) {
    let (ports_tx, ports_rx) = mpsc::unbounded_channel();
    (
        LocalTransport {
            ports_tx,
            next_port: Arc::new(AtomicU64::new(1)),
        },
        PortAcceptor { ports_rx },
    )
}

/// Requesting side of the in-process transport.
#[derive(Clone)]
pub struct LocalTransport {
    ports_tx: mpsc::UnboundedSender<RemotePort>,
    next_port: Arc<AtomicU64>,
}

struct LocalHandle {
    port_id: u64,
    requests: Mutex<Option<mpsc::UnboundedSender<RequestEnvelope>>>,
}

#[async_trait]
impl ChannelHandle for LocalHandle {
    async fn send(&self, envelope: RequestEnvelope) -> Result<(), TransportError> {
        let requests = self.requests.lock().unwrap_or_else(|p| p.into_inner());
        match requests.as_ref() {
            Some(tx) => tx.send(envelope).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }

    fn close(&self) {
        let mut requests = self.requests.lock().unwrap_or_else(|p| p.into_inner());
        if requests.take().is_some() {
            tracing::trace!(port = self.port_id, "Local port closed");
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn open(&self, name: &str) -> Result<OpenedChannel, TransportError> {
        let port_id = self.next_port.fetch_add(1, Ordering::Relaxed);
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let remote = RemotePort {
            name: name.to_string(),
            port_id,
            requests: requests_rx,
            events: events_tx,
        };
        self.ports_tx.send(remote).map_err(|_| TransportError::Open {
            name: name.to_string(),
            reason: "no listener in the receiving context".to_string(),
        })?;

        Ok(OpenedChannel {
            handle: Arc::new(LocalHandle {
                port_id,
                requests: Mutex::new(Some(requests_tx)),
            }),
            events: events_rx,
        })
    }
}

/// Serving side: yields one [`RemotePort`] per opened channel.
pub struct PortAcceptor {
    ports_rx: mpsc::UnboundedReceiver<RemotePort>,
}

impl PortAcceptor {
    /// Next opened port, or `None` once every `LocalTransport` is dropped.
    pub async fn accept(&mut self) -> Option<RemotePort> {
        self.ports_rx.recv().await
    }
}

/// The far end of one channel. Dropping it disconnects the requester.
#[derive(Debug)]
pub struct RemotePort {
    name: String,
    port_id: u64,
    requests: mpsc::UnboundedReceiver<RequestEnvelope>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl RemotePort {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port_id(&self) -> u64 {
        self.port_id
    }

    /// Next request, or `None` once the requester closed the channel.
    pub async fn recv(&mut self) -> Option<RequestEnvelope> {
        self.requests.recv().await
    }

    pub fn respond(&self, envelope: ResponseEnvelope) -> Result<(), TransportError> {
        self.events
            .send(ChannelEvent::Message(envelope))
            .map_err(|_| TransportError::Closed)
    }

    /// Disconnect with an explicit reason.
    pub fn disconnect(self, reason: impl Into<String>) {
        let _ = self.events.send(ChannelEvent::Disconnected(reason.into()));
    }

    /// Resolves once the requester stops listening.
    pub async fn closed(&self) {
        self.events.closed().await
    }
}
