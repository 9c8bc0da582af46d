//! Backend host: answers requests arriving on accepted ports.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::transport::{PortAcceptor, RemoteError, RemotePort, RequestEnvelope, ResponseEnvelope};

/// The remote operation behind the transport.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn call(&self, request: &RequestEnvelope) -> Result<Value, RemoteError>;
}

pub struct BackendHost {
    backend: Arc<dyn BackendClient>,
}

/// Running host. Dropping it leaves the host running; call `shutdown`.
pub struct HostHandle {
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl HostHandle {
    /// Stop accepting ports and wait for the accept loop to exit. Ports
    /// already being served finish on their own.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Backend host task failed");
        }
    }
}

impl BackendHost {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    /// Run the accept loop in the background.
    pub fn spawn(self, acceptor: PortAcceptor) -> HostHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(self.run(acceptor, shutdown_rx));
        HostHandle { shutdown_tx, task }
    }

    pub async fn run(self, mut acceptor: PortAcceptor, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!("Backend host starting");

        loop {
            tokio::select! {
                port = acceptor.accept() => match port {
                    Some(port) => {
                        let backend = self.backend.clone();
                        tokio::spawn(serve_port(backend, port));
                    }
                    None => {
                        tracing::info!("All transports dropped, backend host exiting");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Backend host received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

async fn serve_port(backend: Arc<dyn BackendClient>, mut port: RemotePort) {
    while let Some(request) = port.recv().await {
        let correlation_id = request.correlation_id;

        let outcome = tokio::select! {
            outcome = backend.call(&request) => outcome,
            _ = port.closed() => {
                tracing::debug!(correlation_id = %correlation_id, "Requester went away, abandoning call");
                return;
            }
        };

        let reply = match outcome {
            Ok(payload) => ResponseEnvelope::result(correlation_id, payload),
            Err(error) => {
                tracing::debug!(correlation_id = %correlation_id, error = %error, "Backend call failed");
                ResponseEnvelope::error(correlation_id, error)
            }
        };

        if port.respond(reply).is_err() {
            tracing::debug!(correlation_id = %correlation_id, "Requester closed before reply");
            return;
        }
    }
}
