//! Common test utilities

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use logline::fanout::{DocumentUpdate, FanoutBridge, FanoutError, FanoutStream, LocalFanout};
use logline::protocol::ServerEvent;
use logline::session::{Connection, SessionHub};

/// Create a hub on its own in-process topic
#[allow(dead_code)]
pub fn local_hub() -> Arc<SessionHub> {
    Arc::new(SessionHub::new(Arc::new(LocalFanout::new())))
}

/// Create a hub attached to a shared topic, as another process would be
#[allow(dead_code)]
pub fn hub_on(topic: &LocalFanout) -> Arc<SessionHub> {
    Arc::new(SessionHub::new(Arc::new(topic.clone())))
}

/// Everything already queued for a connection
pub fn drain(conn: &mut Connection) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = conn.events.try_recv() {
        events.push(event);
    }
    events
}

/// Wait for the next event queued for a connection
#[allow(dead_code)]
pub async fn next_event(conn: &mut Connection) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(2), conn.events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("outbox closed")
}

/// Wait until the hub's document reaches `expected`
#[allow(dead_code)]
pub async fn wait_for_document(hub: &SessionHub, expected: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while hub.document().await != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "document never became {expected:?}, still {:?}",
            hub.document().await
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Bridge whose transport is permanently down
#[allow(dead_code)]
pub struct BrokenFanout;

#[async_trait]
impl FanoutBridge for BrokenFanout {
    async fn publish(&self, _update: &DocumentUpdate) -> Result<(), FanoutError> {
        Err(FanoutError::Publish("connection refused".to_string()))
    }

    async fn subscribe(&self) -> Result<FanoutStream, FanoutError> {
        Ok(futures::stream::empty().boxed())
    }

    fn transport(&self) -> &'static str {
        "broken"
    }
}
