//! Session coordination for live connections
//!
//! The hub owns the document, the presence registry and one outbox per
//! connection. Each handler takes the state lock, does its in-memory work,
//! pushes events into outboxes and releases the lock before any network
//! I/O, so mutations never interleave between connections.
//!
//! Outboxes are bounded. A connection whose outbox fills up is cut off: its
//! sender is dropped, the socket writer drains what is queued and stops, and
//! the transport then disconnects the session.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use super::document::DocumentStore;
use super::identity::{ConnectionIdentity, IdentityAllocator};
use super::presence::{PresenceEntry, PresenceRegistry};
use crate::error::LoglineErrorTrait;
use crate::fanout::{DocumentUpdate, FanoutBridge, FanoutError};
use crate::metrics;
use crate::protocol::{
    now_millis, ClientEvent, CursorMovePayload, CursorState, ProtocolError, ServerEvent,
    EDIT_FAILED_MESSAGE,
};

/// Events queued per connection before it is considered stalled
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Sending half of a connection's event queue
pub type Outbox = mpsc::Sender<ServerEvent>;

/// Receiving half of a connection's event queue, drained by the socket writer
pub type Inbox = mpsc::Receiver<ServerEvent>;

/// Handle returned to the transport when a connection joins
#[derive(Debug)]
pub struct Connection {
    pub identity: ConnectionIdentity,
    pub events: Inbox,
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.identity.id
    }
}

#[derive(Default)]
struct HubState {
    document: DocumentStore,
    presence: PresenceRegistry,
    outboxes: HashMap<String, Outbox>,
}

impl HubState {
    fn send_to(&mut self, id: &str, event: ServerEvent) {
        let stalled = match self.outboxes.get(id) {
            Some(outbox) => !deliver(id, outbox, event),
            None => false,
        };
        if stalled {
            self.cut_off([id.to_string()]);
        }
    }

    fn broadcast(&mut self, event: &ServerEvent) {
        let stalled: Vec<String> = self
            .outboxes
            .iter()
            .filter(|(id, outbox)| !deliver(id, outbox, event.clone()))
            .map(|(id, _)| id.clone())
            .collect();
        self.cut_off(stalled);
    }

    fn broadcast_except(&mut self, skip: &str, event: &ServerEvent) {
        let stalled: Vec<String> = self
            .outboxes
            .iter()
            .filter(|(id, _)| id.as_str() != skip)
            .filter(|(id, outbox)| !deliver(id, outbox, event.clone()))
            .map(|(id, _)| id.clone())
            .collect();
        self.cut_off(stalled);
    }

    /// Drop the outboxes of stalled connections so their writers stop
    fn cut_off(&mut self, ids: impl IntoIterator<Item = String>) {
        for id in ids {
            self.outboxes.remove(&id);
            metrics::record_stalled_connection();
        }
    }

    fn presence_event(&self) -> ServerEvent {
        ServerEvent::PresenceUpdate {
            count: self.presence.size(),
            users: self.presence.snapshot(),
        }
    }
}

/// Queue an event; returns false when the outbox is full
///
/// A closed outbox means the socket is going away; disconnect cleans it up.
fn deliver(id: &str, outbox: &Outbox, event: ServerEvent) -> bool {
    match outbox.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            tracing::warn!(
                connection_id = %id,
                event = event.name(),
                "Outbox full, closing stalled connection"
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::trace!(connection_id = %id, "Outbox closed, dropping event");
            true
        }
    }
}

/// Session coordinator for every connection on this process
pub struct SessionHub {
    state: RwLock<HubState>,
    allocator: IdentityAllocator,
    fanout: Arc<dyn FanoutBridge>,
    outbox_capacity: usize,
}

impl SessionHub {
    /// Create a hub with an empty document
    pub fn new(fanout: Arc<dyn FanoutBridge>) -> Self {
        Self::with_outbox_capacity(fanout, DEFAULT_OUTBOX_CAPACITY)
    }

    /// Create a hub whose connections may queue at most `capacity` events
    pub fn with_outbox_capacity(fanout: Arc<dyn FanoutBridge>, capacity: usize) -> Self {
        Self {
            state: RwLock::new(HubState::default()),
            allocator: IdentityAllocator::new(),
            fanout,
            outbox_capacity: capacity.max(1),
        }
    }

    /// Transport name of the fanout bridge
    pub fn transport(&self) -> &'static str {
        self.fanout.transport()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register a new connection and greet it
    ///
    /// The new connection receives `document:init`, then every local
    /// connection (including the new one) receives the presence snapshot.
    pub async fn connect(&self) -> Connection {
        let (outbox, events) = mpsc::channel(self.outbox_capacity);
        let mut state = self.state.write().await;

        let identity = self.allocator.allocate(state.presence.size());
        let id = identity.id.clone();

        state.presence.add(&id, identity.clone());
        state.outboxes.insert(id.clone(), outbox);

        let users = state.presence.size();
        let init = ServerEvent::DocumentInit {
            content: state.document.read().to_string(),
            users,
        };
        state.send_to(&id, init);
        let presence = state.presence_event();
        state.broadcast(&presence);

        metrics::record_connect(users);
        tracing::info!(
            connection_id = %id,
            name = %identity.name,
            color = %identity.color,
            users,
            "User connected"
        );

        Connection { identity, events }
    }

    /// Remove a connection and tell the remaining peers
    ///
    /// Peers receive the new presence snapshot plus an explicit
    /// `cursor:removed` (and `user:left`) so cursor widgets are dropped.
    pub async fn disconnect(&self, id: &str) {
        let mut state = self.state.write().await;

        state.outboxes.remove(id);
        if state.presence.remove(id).is_none() {
            return;
        }

        let presence = state.presence_event();
        state.broadcast(&presence);
        state.broadcast(&ServerEvent::CursorRemoved {
            user_id: id.to_string(),
        });
        state.broadcast(&ServerEvent::UserLeft(id.to_string()));

        let users = state.presence.size();
        metrics::record_disconnect(users);
        tracing::info!(connection_id = %id, users, "User disconnected");
    }

    // ========================================================================
    // Client Events
    // ========================================================================

    /// Decode and dispatch one text frame from a connection
    ///
    /// Decoding failures are reported to the sender only; the session stays open.
    pub async fn handle_frame(&self, id: &str, text: &str) {
        match ClientEvent::parse(text) {
            Ok(ClientEvent::DocumentEdit(edit)) => {
                // Failures are already reported to the sender
                let _ = self.edit(id, edit.content).await;
            }
            Ok(ClientEvent::CursorMove(cursor)) => self.cursor_move(id, cursor).await,
            Ok(ClientEvent::Unknown(name)) => {
                tracing::debug!(connection_id = %id, event = %name, "Ignoring unknown event");
            }
            Err(e) => self.reject(id, &e).await,
        }
    }

    /// Relay a cursor move to every other local connection
    ///
    /// Cursors are never sent through the fanout bridge.
    pub async fn cursor_move(&self, id: &str, cursor: CursorMovePayload) {
        let mut state = self.state.write().await;
        let Some(identity) = state.presence.get(id) else {
            tracing::debug!(connection_id = %id, "Cursor move from unregistered connection");
            return;
        };

        let event = ServerEvent::CursorUpdate(CursorState {
            user_id: identity.id.clone(),
            color: identity.color,
            position: cursor.position,
            selection: cursor.selection,
        });
        state.broadcast_except(id, &event);

        metrics::record_cursor_relay();
        tracing::trace!(connection_id = %id, "Relayed cursor");
    }

    /// Apply an edit locally, echo it to local peers, then publish it
    ///
    /// Local peers are updated before the publish so that a broken transport
    /// still leaves this process consistent. A publish failure is reported to
    /// the sender as an `error` event; the local apply is not rolled back.
    pub async fn edit(&self, id: &str, content: String) -> Result<(), FanoutError> {
        let timestamp = now_millis();
        {
            let mut state = self.state.write().await;
            state.document.apply(content.as_str());
            state.broadcast_except(
                id,
                &ServerEvent::DocumentUpdate {
                    content: content.clone(),
                    timestamp,
                },
            );
        }

        metrics::record_edit();
        tracing::debug!(connection_id = %id, bytes = content.len(), "Applied edit");

        let update = DocumentUpdate::new(content, id, timestamp);
        match self.fanout.publish(&update).await {
            Ok(()) => {
                metrics::record_publish(true);
                Ok(())
            }
            Err(e) => {
                metrics::record_publish(false);
                tracing::error!(
                    connection_id = %id,
                    category = e.category().as_str(),
                    recoverable = e.is_recoverable(),
                    error = %e,
                    "Error handling edit"
                );
                self.send_error(id, "document:edit", EDIT_FAILED_MESSAGE).await;
                Err(e)
            }
        }
    }

    async fn reject(&self, id: &str, err: &ProtocolError) {
        tracing::warn!(
            connection_id = %id,
            category = err.category().as_str(),
            error = %err,
            "Rejected client message"
        );
        self.send_error(id, err.event(), err.client_message()).await;
    }

    async fn send_error(&self, id: &str, event: &str, message: &str) {
        metrics::record_client_error(event);
        self.state.write().await.send_to(id, ServerEvent::error(message));
    }

    // ========================================================================
    // Fanout
    // ========================================================================

    /// Apply an update delivered on the broadcast topic
    ///
    /// Every local connection is notified, the originator included.
    pub async fn apply_remote(&self, update: DocumentUpdate) {
        let mut state = self.state.write().await;
        state.document.apply(update.content.as_str());
        state.broadcast(&ServerEvent::DocumentUpdate {
            content: update.content,
            timestamp: update.timestamp,
        });

        metrics::record_fanout_received();
        tracing::trace!(origin = %update.origin_id, "Applied fanout update");
    }

    /// Subscribe to the fanout topic and feed deliveries into this hub
    ///
    /// The subscription is established before this returns, so updates
    /// published afterwards are guaranteed to be seen.
    pub async fn spawn_fanout_listener(self: &Arc<Self>) -> Result<JoinHandle<()>, FanoutError> {
        let mut updates = self.fanout.subscribe().await?;
        let hub = Arc::clone(self);

        Ok(tokio::spawn(async move {
            while let Some(update) = updates.next().await {
                hub.apply_remote(update).await;
            }
            tracing::error!(
                transport = hub.transport(),
                "Fanout subscription ended, running in single-process mode"
            );
        }))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Current document content
    pub async fn document(&self) -> String {
        self.state.read().await.document.read().to_string()
    }

    /// Number of connections open on this process
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.presence.size()
    }

    pub async fn presence(&self) -> Vec<PresenceEntry> {
        self.state.read().await.presence.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::LocalFanout;
    use crate::protocol::CursorPosition;
    use proptest::prelude::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn hub() -> SessionHub {
        SessionHub::new(Arc::new(LocalFanout::new()))
    }

    fn drain(conn: &mut Connection) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = conn.events.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_connect_sends_init_then_presence() {
        let hub = hub();
        let mut a = hub.connect().await;

        let events = drain(&mut a);
        assert_eq!(
            events[0],
            ServerEvent::DocumentInit {
                content: String::new(),
                users: 1
            }
        );
        let ServerEvent::PresenceUpdate { count, users } = &events[1] else {
            panic!("expected presence:update, got {:?}", events[1]);
        };
        assert_eq!(*count, 1);
        assert_eq!(users[0].id, a.identity.id);
    }

    #[tokio::test]
    async fn test_registry_tracks_open_connections() {
        let hub = hub();
        let a = hub.connect().await;
        let b = hub.connect().await;
        assert_eq!(hub.connection_count().await, 2);

        hub.disconnect(a.id()).await;
        assert_eq!(hub.connection_count().await, 1);

        // Disconnecting twice is harmless
        hub.disconnect(a.id()).await;
        assert_eq!(hub.connection_count().await, 1);

        hub.disconnect(b.id()).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_cursor_relay_excludes_sender() {
        let hub = hub();
        let mut a = hub.connect().await;
        let mut b = hub.connect().await;
        drain(&mut a);
        drain(&mut b);

        hub.cursor_move(
            a.id(),
            CursorMovePayload {
                position: CursorPosition { line: 2, column: 4 },
                selection: None,
            },
        )
        .await;

        assert!(drain(&mut a).is_empty());
        let events = drain(&mut b);
        assert_eq!(events.len(), 1);
        let ServerEvent::CursorUpdate(cursor) = &events[0] else {
            panic!("expected cursor:update");
        };
        assert_eq!(cursor.user_id, a.identity.id);
        assert_eq!(cursor.color, a.identity.color);
        assert_eq!(cursor.position.column, 4);
    }

    #[tokio::test]
    async fn test_disconnect_announces_cursor_removal() {
        let hub = hub();
        let a = hub.connect().await;
        let mut b = hub.connect().await;
        drain(&mut b);

        hub.disconnect(a.id()).await;

        let events = drain(&mut b);
        assert!(matches!(&events[0], ServerEvent::PresenceUpdate { count: 1, .. }));
        assert_eq!(
            events[1],
            ServerEvent::CursorRemoved {
                user_id: a.identity.id.clone()
            }
        );
        assert_eq!(events[2], ServerEvent::UserLeft(a.identity.id.clone()));
    }

    #[tokio::test]
    async fn test_malformed_edit_reports_error_and_keeps_document() {
        let hub = hub();
        let mut a = hub.connect().await;
        hub.edit(a.id(), "kept".into()).await.unwrap();
        drain(&mut a);

        hub.handle_frame(a.id(), r#"{"event":"document:edit","data":{"text":"x"}}"#)
            .await;

        assert_eq!(
            drain(&mut a),
            vec![ServerEvent::error("Failed to process edit")]
        );
        assert_eq!(hub.document().await, "kept");
        assert_eq!(hub.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_colors_follow_registry_size() {
        let hub = hub();
        let a = hub.connect().await;
        let b = hub.connect().await;
        assert_eq!(a.identity.color.index(), 0);
        assert_eq!(b.identity.color.index(), 1);

        // Churn: leaving frees the slot count, so the next join reuses index 1
        hub.disconnect(a.id()).await;
        let c = hub.connect().await;
        assert_eq!(c.identity.color, b.identity.color);
    }

    #[tokio::test]
    async fn test_stalled_connection_is_cut_off() {
        let hub = SessionHub::with_outbox_capacity(Arc::new(LocalFanout::new()), 4);
        let mut slow = hub.connect().await;
        let mut fast = hub.connect().await;
        drain(&mut fast);

        // init + two presence updates queued; two relays overflow the fourth slot
        for column in 0..2 {
            hub.cursor_move(
                fast.id(),
                CursorMovePayload {
                    position: CursorPosition { line: 1, column },
                    selection: None,
                },
            )
            .await;
        }

        assert_eq!(drain(&mut slow).len(), 4);
        assert!(matches!(slow.events.try_recv(), Err(TryRecvError::Disconnected)));

        // Peers are unaffected and the session stays registered until the
        // transport disconnects it
        hub.edit(fast.id(), "still here".into()).await.unwrap();
        assert_eq!(hub.connection_count().await, 2);
        assert!(fast.events.try_recv().is_err());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Connect,
        /// Disconnect the n-th connection ever opened, open or not
        Disconnect(usize),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![Just(Step::Connect), (0usize..16).prop_map(Step::Disconnect)]
    }

    proptest! {
        #[test]
        fn prop_registry_mirrors_open_connections(
            steps in proptest::collection::vec(step_strategy(), 1..64)
        ) {
            tokio_test::block_on(async {
                let hub = SessionHub::with_outbox_capacity(Arc::new(LocalFanout::new()), 1024);
                let mut opened: Vec<Connection> = Vec::new();
                let mut open_ids: Vec<String> = Vec::new();

                for step in steps {
                    match step {
                        Step::Connect => {
                            let conn = hub.connect().await;
                            open_ids.push(conn.id().to_string());
                            opened.push(conn);
                        }
                        Step::Disconnect(n) if !opened.is_empty() => {
                            let id = opened[n % opened.len()].id().to_string();
                            hub.disconnect(&id).await;
                            open_ids.retain(|open| *open != id);
                        }
                        Step::Disconnect(_) => {}
                    }

                    assert_eq!(hub.connection_count().await, open_ids.len());
                    let ids: Vec<String> = hub.presence().await.into_iter().map(|p| p.id).collect();
                    assert_eq!(ids, open_ids);
                }
            });
        }
    }
}
