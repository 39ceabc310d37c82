//! Cross-process fanout of document updates
//!
//! Every process publishes the full document content on one broadcast topic
//! after each local edit, and every process (the publisher included) applies
//! whatever arrives on the topic. Delivery order is whatever the transport
//! provides; nothing is sequenced on top.
//!
//! # Architecture
//!
//! ```text
//! client edit ──► SessionHub ──► FanoutBridge::publish ──► topic
//!                                                            │
//!            ┌───────────────────────────────────────────────┘
//!            ▼
//! FanoutBridge::subscribe (every process) ──► SessionHub::apply_remote
//!                                                  │
//!                                                  ▼
//!                                      all local connections
//! ```
//!
//! The hub only sees the [`FanoutBridge`] trait, so the transport (or a
//! stronger consistency scheme) can be swapped without touching sessions.

pub mod local;
pub mod redis_bridge;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorCategory, LoglineErrorTrait};

pub use local::LocalFanout;
pub use redis_bridge::RedisFanout;

/// Stream of updates delivered on the topic
pub type FanoutStream = BoxStream<'static, DocumentUpdate>;

/// One message on the broadcast topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpdate {
    /// Full document content after the edit
    pub content: String,

    /// Connection that produced the edit; informational only
    #[serde(rename = "userId")]
    pub origin_id: String,

    /// Milliseconds since the Unix epoch at publish time
    pub timestamp: i64,
}

impl DocumentUpdate {
    pub fn new(content: impl Into<String>, origin_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            content: content.into(),
            origin_id: origin_id.into(),
            timestamp,
        }
    }

    pub fn encode(&self) -> Result<String, FanoutError> {
        serde_json::to_string(self).map_err(|e| FanoutError::Encode(e.to_string()))
    }

    /// Decode a topic payload, logging and dropping anything malformed
    pub fn decode(payload: &str) -> Option<Self> {
        match serde_json::from_str(payload) {
            Ok(update) => Some(update),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    bytes = payload.len(),
                    "Skipping malformed fanout message"
                );
                None
            }
        }
    }
}

/// Publish/subscribe bridge between processes
#[async_trait]
pub trait FanoutBridge: Send + Sync + 'static {
    /// Send an update to every subscribed process
    async fn publish(&self, update: &DocumentUpdate) -> Result<(), FanoutError>;

    /// Open a subscription to the topic
    async fn subscribe(&self) -> Result<FanoutStream, FanoutError>;

    /// Transport name for logs and health output
    fn transport(&self) -> &'static str;
}

/// Fanout transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FanoutError {
    #[error("Failed to connect to broadcast transport: {0}")]
    Connect(String),

    #[error("Failed to publish update: {0}")]
    Publish(String),

    #[error("Failed to subscribe to topic: {0}")]
    Subscribe(String),

    #[error("Failed to encode update: {0}")]
    Encode(String),
}

impl LoglineErrorTrait for FanoutError {
    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Transport
    }
}
