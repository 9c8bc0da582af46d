//! RequestRouter: binds one outgoing request to exactly one terminal outcome.
//!
//! # Responsibilities
//! - Consult the SessionGuard before credentialed requests
//! - Issue correlation ids and track pending requests
//! - Open one channel per request and send the envelope
//! - Settle on the first of: matching response, disconnect, deadline, cancel
//!
//! # Design Decisions
//! - Settlement is a single `DashMap::remove`; whichever event removes the
//!   entry wins and every later event finds nothing
//! - Each request has a driver task, spawned at registration, selecting over
//!   channel setup and then channel events, its deadline and a stop signal
//!   that fires when the entry is dropped; a stalled open or send still
//!   times out
//! - The channel is closed inside settlement, so every exit path closes it

use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::config::RouterConfig;
use crate::error::{AuthError, RequestError};
use crate::observability::metrics;
use crate::routing::correlation::CorrelationId;
use crate::routing::pending::{PendingEntry, PendingRequest, RequestState, Settlement};
use crate::session::SessionGuard;
use crate::transport::{ChannelEvent, ChannelHandle, RequestEnvelope, ResponseEnvelope, Transport};

/// An operation to perform in the serving context.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: String,
    pub payload: Value,
}

impl Request {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }
}

/// Per-submission options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitOptions {
    /// Deadline; the router default applies when unset.
    pub timeout: Option<Duration>,
    /// Obtain a valid credential before dispatching.
    pub requires_auth: bool,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.requires_auth = true;
        self
    }
}

pub(crate) struct RouterInner {
    transport: Arc<dyn Transport>,
    session: Option<SessionGuard>,
    config: RouterConfig,
    pending: DashMap<CorrelationId, PendingEntry>,
}

/// Correlation router over a [`Transport`].
#[derive(Clone)]
pub struct RequestRouter {
    inner: Arc<RouterInner>,
}

impl RequestRouter {
    pub fn new(transport: Arc<dyn Transport>, config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                transport,
                session: None,
                config,
                pending: DashMap::new(),
            }),
        }
    }

    /// Router that checks credentials for `requires_auth` submissions.
    pub fn with_session(transport: Arc<dyn Transport>, session: SessionGuard, config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                transport,
                session: Some(session),
                config,
                pending: DashMap::new(),
            }),
        }
    }

    /// Submit a request. The returned handle resolves exactly once.
    pub async fn submit(&self, request: Request, options: SubmitOptions) -> ResponseHandle {
        let inner = &self.inner;
        let timeout = options.timeout.unwrap_or_else(|| inner.config.default_timeout());

        let authorization = if options.requires_auth {
            match inner.authorize().await {
                Ok(authorization) => Some(authorization),
                Err(e) => {
                    tracing::debug!(kind = %request.kind, error = %e, "Credential check failed, not dispatching");
                    metrics::record_settlement(RequestState::Failed.as_str());
                    return ResponseHandle::settled(Err(e.into()));
                }
            }
        } else {
            None
        };

        let correlation_id = CorrelationId::next();
        let created_at = Instant::now();
        let (reply_tx, reply_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        inner.pending.insert(
            correlation_id,
            PendingEntry {
                request: PendingRequest {
                    correlation_id,
                    kind: request.kind.clone(),
                    created_at,
                    deadline: created_at + timeout,
                    state: RequestState::Pending,
                },
                reply: reply_tx,
                channel: None,
                _stop: stop_tx,
            },
        );
        metrics::record_pending(inner.pending.len());
        tracing::debug!(
            correlation_id = %correlation_id,
            kind = %request.kind,
            timeout_ms = timeout.as_millis() as u64,
            "Request registered"
        );

        let envelope = RequestEnvelope {
            kind: request.kind,
            correlation_id,
            payload: request.payload,
            authorization,
        };
        tokio::spawn(drive(inner.clone(), envelope, created_at + timeout, stop_rx));

        ResponseHandle {
            correlation_id: Some(correlation_id),
            reply: reply_rx,
            router: Arc::downgrade(inner),
        }
    }

    /// Deliver an inbound envelope. Unknown or already-settled ids are dropped.
    pub fn on_channel_message(&self, envelope: ResponseEnvelope) -> bool {
        self.inner.on_channel_message(envelope)
    }

    pub fn on_channel_disconnect(&self, correlation_id: CorrelationId, reason: impl Into<String>) -> bool {
        self.inner.on_channel_disconnect(correlation_id, reason.into())
    }

    pub fn on_timeout(&self, correlation_id: CorrelationId) -> bool {
        self.inner.on_timeout(correlation_id)
    }

    /// Caller-initiated cancellation. Local only: the peer is not told.
    pub fn cancel(&self, correlation_id: CorrelationId) -> bool {
        self.inner.cancel(correlation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, correlation_id: CorrelationId) -> bool {
        self.inner.pending.contains_key(&correlation_id)
    }

    pub fn pending(&self, correlation_id: CorrelationId) -> Option<PendingRequest> {
        self.inner
            .pending
            .get(&correlation_id)
            .map(|entry| entry.request.clone())
    }
}

impl RouterInner {
    async fn authorize(&self) -> Result<String, AuthError> {
        match &self.session {
            Some(session) => session.ensure_valid().await.map(|bundle| bundle.authorization()),
            None => {
                tracing::warn!("Credentialed request submitted to a router without a SessionGuard");
                Err(AuthError::AuthRequired)
            }
        }
    }

    /// Open the request's channel and send its envelope. `None` once the
    /// request has been settled along the way.
    async fn connect(&self, envelope: RequestEnvelope) -> Option<mpsc::UnboundedReceiver<ChannelEvent>> {
        let correlation_id = envelope.correlation_id;

        let opened = match self.transport.open(&self.config.channel_name).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(correlation_id = %correlation_id, error = %e, "Failed to open channel");
                self.settle(
                    correlation_id,
                    Settlement::Failed(RequestError::ConnectionLost(e.to_string())),
                    "open_failed",
                );
                return None;
            }
        };

        if !self.attach_channel(correlation_id, opened.handle.clone()) {
            // Settled while the channel was opening
            opened.handle.close();
            return None;
        }

        if let Err(e) = opened.handle.send(envelope).await {
            self.settle(
                correlation_id,
                Settlement::Failed(RequestError::ConnectionLost(e.to_string())),
                "send_failed",
            );
            return None;
        }

        Some(opened.events)
    }

    fn attach_channel(&self, correlation_id: CorrelationId, channel: Arc<dyn ChannelHandle>) -> bool {
        match self.pending.get_mut(&correlation_id) {
            Some(mut entry) => {
                entry.channel = Some(channel);
                true
            }
            None => false,
        }
    }

    fn on_channel_message(&self, envelope: ResponseEnvelope) -> bool {
        match envelope {
            ResponseEnvelope::Result {
                correlation_id,
                payload,
            } => self.settle(correlation_id, Settlement::Fulfilled(payload), "message"),
            ResponseEnvelope::Error {
                correlation_id,
                error,
            } => self.settle(
                correlation_id,
                Settlement::Failed(RequestError::Remote(error)),
                "message",
            ),
        }
    }

    fn on_channel_disconnect(&self, correlation_id: CorrelationId, reason: String) -> bool {
        self.settle(
            correlation_id,
            Settlement::Failed(RequestError::ConnectionLost(reason)),
            "disconnect",
        )
    }

    fn on_timeout(&self, correlation_id: CorrelationId) -> bool {
        self.settle(correlation_id, Settlement::TimedOut, "timeout")
    }

    fn cancel(&self, correlation_id: CorrelationId) -> bool {
        self.settle(correlation_id, Settlement::Cancelled, "cancel")
    }

    /// Move a request out of `Pending`. Returns false if another event got
    /// there first.
    fn settle(&self, correlation_id: CorrelationId, settlement: Settlement, event: &'static str) -> bool {
        let Some((_, entry)) = self.pending.remove(&correlation_id) else {
            tracing::debug!(
                correlation_id = %correlation_id,
                event,
                "Dropping event for settled or unknown request"
            );
            metrics::record_dropped_event(event);
            return false;
        };

        let PendingEntry {
            mut request,
            reply,
            channel,
            _stop,
        } = entry;

        if let Some(channel) = channel {
            channel.close();
        }

        request.state = settlement.state();
        metrics::record_settlement(request.state.as_str());
        metrics::record_pending(self.pending.len());
        tracing::debug!(
            correlation_id = %correlation_id,
            kind = %request.kind,
            state = request.state.as_str(),
            elapsed_ms = request.created_at.elapsed().as_millis() as u64,
            "Request settled"
        );

        if reply.send(settlement.into_result(&request)).is_err() {
            tracing::trace!(correlation_id = %correlation_id, "Caller stopped waiting before settlement");
        }
        true
    }
}

/// Per-request event loop. Exits once the request has left `Pending`.
async fn drive(
    inner: Arc<RouterInner>,
    envelope: RequestEnvelope,
    deadline: Instant,
    mut stop: oneshot::Receiver<()>,
) {
    let correlation_id = envelope.correlation_id;
    let deadline = tokio::time::sleep_until(deadline);
    tokio::pin!(deadline);

    let connect = inner.connect(envelope);
    let mut events = tokio::select! {
        _ = &mut stop => return,
        _ = &mut deadline => {
            tracing::debug!(correlation_id = %correlation_id, "Request deadline reached during channel setup");
            inner.on_timeout(correlation_id);
            return;
        }
        connected = connect => match connected {
            Some(events) => events,
            None => return,
        },
    };

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = &mut deadline => {
                tracing::debug!(correlation_id = %correlation_id, "Request deadline reached");
                inner.on_timeout(correlation_id);
                break;
            }
            event = events.recv() => match event {
                Some(ChannelEvent::Message(envelope)) => {
                    if envelope.correlation_id() != correlation_id {
                        tracing::debug!(
                            correlation_id = %correlation_id,
                            received = %envelope.correlation_id(),
                            "Response carries a foreign correlation id"
                        );
                    }
                    inner.on_channel_message(envelope);
                }
                Some(ChannelEvent::Disconnected(reason)) => {
                    inner.on_channel_disconnect(correlation_id, reason);
                    break;
                }
                None => {
                    inner.on_channel_disconnect(correlation_id, "channel closed by peer".to_string());
                    break;
                }
            }
        }
    }
}

/// Awaitable result of a submission.
///
/// Resolves to the response payload, or to the [`RequestError`] that settled
/// the request (`RequestError::Cancelled` after cancellation).
pub struct ResponseHandle {
    correlation_id: Option<CorrelationId>,
    reply: oneshot::Receiver<Result<Value, RequestError>>,
    router: Weak<RouterInner>,
}

impl ResponseHandle {
    fn settled(result: Result<Value, RequestError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self {
            correlation_id: None,
            reply: rx,
            router: Weak::new(),
        }
    }

    /// `None` when the request was settled before an id was issued.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    pub fn cancel(&self) -> bool {
        match (self.correlation_id, self.router.upgrade()) {
            (Some(id), Some(router)) => router.cancel(id),
            _ => false,
        }
    }
}

impl Future for ResponseHandle {
    type Output = Result<Value, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.reply)
            .poll(cx)
            .map(|result| result.unwrap_or_else(|_| Err(RequestError::ConnectionLost("router dropped".to_string()))))
    }
}

impl std::fmt::Debug for ResponseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandle")
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local_transport;
    use serde_json::json;

    fn router() -> (RequestRouter, crate::transport::PortAcceptor) {
        let (transport, acceptor) = local_transport();
        (RequestRouter::new(Arc::new(transport), RouterConfig::default()), acceptor)
    }

    #[tokio::test]
    async fn test_settle_is_exactly_once() {
        let (router, _acceptor) = router();
        let handle = router
            .submit(Request::new("ping", json!({})), SubmitOptions::new())
            .await;
        let id = handle.correlation_id().unwrap();
        assert!(router.is_pending(id));

        assert!(router.on_channel_message(ResponseEnvelope::result(id, json!("pong"))));
        assert!(!router.on_timeout(id));
        assert!(!router.on_channel_disconnect(id, "late"));
        assert!(!router.cancel(id));

        assert_eq!(handle.await, Ok(json!("pong")));
        assert_eq!(router.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_auth_without_session_guard() {
        let (router, mut acceptor) = router();
        let handle = router
            .submit(Request::new("ping", json!({})), SubmitOptions::new().authenticated())
            .await;
        assert!(handle.correlation_id().is_none());
        assert!(!handle.cancel());
        assert_eq!(handle.await, Err(RequestError::Auth(AuthError::AuthRequired)));

        // No channel was opened
        drop(router);
        assert!(acceptor.accept().await.is_none());
    }

    #[tokio::test]
    async fn test_open_failure_settles_connection_lost() {
        let (router, acceptor) = router();
        drop(acceptor);
        let handle = router
            .submit(Request::new("ping", json!({})), SubmitOptions::new())
            .await;
        assert!(matches!(handle.await, Err(RequestError::ConnectionLost(_))));
        assert_eq!(router.pending_count(), 0);
    }
}
