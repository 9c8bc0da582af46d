//! Transport abstraction between two execution contexts.
//!
//! A transport opens one logical channel per request. The channel's outbound
//! half is a [`ChannelHandle`]; inbound traffic arrives as [`ChannelEvent`]s
//! on a stream that ends when the peer goes away.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::transport::envelope::{RequestEnvelope, ResponseEnvelope};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("failed to open channel '{name}': {reason}")]
    Open { name: String, reason: String },

    #[error("channel closed")]
    Closed,
}

/// Inbound event on an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(ResponseEnvelope),
    Disconnected(String),
}

/// Outbound half of a channel.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    async fn send(&self, envelope: RequestEnvelope) -> Result<(), TransportError>;

    /// Close the channel. Idempotent.
    fn close(&self);
}

/// A freshly opened channel.
pub struct OpenedChannel {
    pub handle: Arc<dyn ChannelHandle>,
    pub events: mpsc::UnboundedReceiver<ChannelEvent>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, name: &str) -> Result<OpenedChannel, TransportError>;
}
