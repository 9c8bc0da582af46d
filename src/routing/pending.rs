//! Pending-request records and their terminal outcomes.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::RequestError;
use crate::routing::correlation::CorrelationId;
use crate::transport::ChannelHandle;

/// Lifecycle state of a routed request. Leaves `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Fulfilled,
    Failed,
    TimedOut,
    Cancelled,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Fulfilled => "fulfilled",
            RequestState::Failed => "failed",
            RequestState::TimedOut => "timed_out",
            RequestState::Cancelled => "cancelled",
        }
    }
}

/// Snapshot of a tracked request.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub correlation_id: CorrelationId,
    pub kind: String,
    pub created_at: Instant,
    pub deadline: Instant,
    pub state: RequestState,
}

impl PendingRequest {
    pub fn timeout(&self) -> Duration {
        self.deadline.saturating_duration_since(self.created_at)
    }
}

/// The event that settles a request.
#[derive(Debug)]
pub(crate) enum Settlement {
    Fulfilled(Value),
    Failed(RequestError),
    TimedOut,
    Cancelled,
}

impl Settlement {
    pub(crate) fn state(&self) -> RequestState {
        match self {
            Settlement::Fulfilled(_) => RequestState::Fulfilled,
            Settlement::Failed(_) => RequestState::Failed,
            Settlement::TimedOut => RequestState::TimedOut,
            Settlement::Cancelled => RequestState::Cancelled,
        }
    }

    pub(crate) fn into_result(self, request: &PendingRequest) -> Result<Value, RequestError> {
        match self {
            Settlement::Fulfilled(payload) => Ok(payload),
            Settlement::Failed(error) => Err(error),
            Settlement::TimedOut => Err(RequestError::Timeout(request.timeout())),
            Settlement::Cancelled => Err(RequestError::Cancelled),
        }
    }
}

/// Router-owned entry. Dropping it stops the request's driver task.
pub(crate) struct PendingEntry {
    pub(crate) request: PendingRequest,
    pub(crate) reply: oneshot::Sender<Result<Value, RequestError>>,
    pub(crate) channel: Option<Arc<dyn ChannelHandle>>,
    pub(crate) _stop: oneshot::Sender<()>,
}
