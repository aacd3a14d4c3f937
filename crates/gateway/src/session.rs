//! Client session tracking for the streamable HTTP transport.
//!
//! A session is minted by the first `initialize` POST and identified by
//! the opaque `mcp-session-id` header on every request after that. Each
//! session carries a queue of server→client notifications drained by
//! the `GET /mcp` event stream.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

/// One downstream MCP session.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    notify_tx: mpsc::UnboundedSender<Value>,
    notify_rx: Arc<TokioMutex<mpsc::UnboundedReceiver<Value>>>,
}

impl Session {
    fn new() -> Arc<Self> {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            notify_tx,
            notify_rx: Arc::new(TokioMutex::new(notify_rx)),
        })
    }

    /// Queue a notification for the session's event stream.
    pub fn notify(&self, msg: Value) {
        let _ = self.notify_tx.send(msg);
    }

    /// Borrow the event-stream receiver for an SSE connection. `None`
    /// while another stream holds it; dropping the guard (client
    /// disconnect) makes it attachable again.
    pub fn take_stream(&self) -> Option<OwnedMutexGuard<mpsc::UnboundedReceiver<Value>>> {
        self.notify_rx.clone().try_lock_owned().ok()
    }
}

/// All live sessions, keyed by id. Insert/delete happen under the lock;
/// lookups clone the `Arc`.
#[derive(Default)]
pub struct SessionMap {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new session with a fresh opaque id.
    pub fn create(&self) -> Arc<Session> {
        let session = Session::new();
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Drop a session. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_and_lookup() {
        let map = SessionMap::new();
        let session = map.create();
        assert!(!session.id.is_empty());
        assert!(map.get(&session.id).is_some());
        assert!(map.get("deadbeef").is_none());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn ids_are_unique() {
        let map = SessionMap::new();
        let a = map.create();
        let b = map.create();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn remove_reports_existence() {
        let map = SessionMap::new();
        let session = map.create();
        assert!(map.remove(&session.id));
        assert!(!map.remove(&session.id));
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn notifications_flow_to_the_stream() {
        let map = SessionMap::new();
        let session = map.create();
        let mut rx = session.take_stream().unwrap();
        assert!(session.take_stream().is_none());

        session.notify(json!({"method": "notifications/message"}));
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg["method"], "notifications/message");

        // Dropping the stream makes the receiver attachable again.
        drop(rx);
        assert!(session.take_stream().is_some());
    }
}
