//! In-process broadcast topic
//!
//! Clones of a [`LocalFanout`] share one topic, so two hubs holding clones
//! behave like two server processes attached to the same Redis channel.
//! Also used as the fallback when Redis is unreachable at start-up.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::{DocumentUpdate, FanoutBridge, FanoutError, FanoutStream};

/// Messages buffered per subscriber before it starts lagging
const TOPIC_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct LocalFanout {
    sender: broadcast::Sender<Arc<str>>,
}

impl LocalFanout {
    pub fn new() -> Self {
        Self::with_capacity(TOPIC_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Number of live subscriptions on the topic
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalFanout {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FanoutBridge for LocalFanout {
    async fn publish(&self, update: &DocumentUpdate) -> Result<(), FanoutError> {
        let payload: Arc<str> = update.encode()?.into();
        // No subscribers is not an error, same as PUBLISH reaching 0 clients
        let receivers = self.sender.send(payload).unwrap_or(0);
        tracing::trace!(receivers, "Published update on local topic");
        Ok(())
    }

    async fn subscribe(&self) -> Result<FanoutStream, FanoutError> {
        let rx = self.sender.subscribe();

        let payloads = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Local fanout subscriber lagged, skipping");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        Ok(payloads
            .filter_map(|payload| async move { DocumentUpdate::decode(&payload) })
            .boxed())
    }

    fn transport(&self) -> &'static str {
        "local"
    }
}
