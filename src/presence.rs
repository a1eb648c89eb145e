//! Presence registry: which users hold a live realtime connection.
//!
//! One user maps to at most one connection. A second register for the same
//! user replaces the mapping; the older connection keeps receiving broadcasts
//! until it closes, but targeted pushes go to the newest one. Closing a
//! connection only clears the user's mapping when it still points at that
//! connection, so an old device disconnecting never evicts a newer one.
//!
//! Every register and unregister broadcasts the visible online set to every
//! live connection. Users with `show_online_status` off are left out of that
//! set but can still receive pushes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::logging;
use crate::model::{Message, Notification};

pub type ConnectionId = u64;

/// Events pushed to connected clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    OnlineUsers {
        user_ids: Vec<String>,
    },
    NewMessage {
        message: Message,
    },
    Notification {
        notification: Notification,
    },
    FriendRequestReceived {
        from_id: String,
        from_name: String,
        note: Option<String>,
    },
    FriendRequestAccepted {
        by_id: String,
        by_name: String,
    },
}

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

struct Connection {
    user_id: String,
    sender: EventSender,
}

#[derive(Default)]
struct Inner {
    by_user: HashMap<String, ConnectionId>,
    connections: HashMap<ConnectionId, Connection>,
    hidden: HashSet<String>,
}

impl Inner {
    fn visible_online(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .by_user
            .keys()
            .filter(|id| !self.hidden.contains(*id))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    fn broadcast_online(&self) {
        let event = ServerEvent::OnlineUsers {
            user_ids: self.visible_online(),
        };
        for conn in self.connections.values() {
            let _ = conn.sender.send(event.clone());
        }
    }
}

#[derive(Default)]
pub struct PresenceRegistry {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user_id` to a fresh connection and broadcast the online set.
    ///
    /// `visible` mirrors the user's `show_online_status` setting.
    pub fn register(&self, user_id: &str, visible: bool, sender: EventSender) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut inner = self.inner.write();
        if visible {
            inner.hidden.remove(user_id);
        } else {
            inner.hidden.insert(user_id.to_string());
        }
        inner.connections.insert(
            id,
            Connection {
                user_id: user_id.to_string(),
                sender,
            },
        );
        if let Some(previous) = inner.by_user.insert(user_id.to_string(), id) {
            tracing::debug!(
                "presence: {} replaced connection {} with {}",
                logging::user_id(user_id),
                previous,
                id
            );
        }
        tracing::info!("presence: {} online (conn {})", logging::user_id(user_id), id);
        inner.broadcast_online();
        id
    }

    /// Drop a connection. Unknown ids are ignored.
    pub fn unregister(&self, connection_id: ConnectionId) {
        let mut inner = self.inner.write();
        let Some(conn) = inner.connections.remove(&connection_id) else {
            return;
        };
        if inner.by_user.get(&conn.user_id) == Some(&connection_id) {
            inner.by_user.remove(&conn.user_id);
            inner.hidden.remove(&conn.user_id);
            tracing::info!("presence: {} offline", logging::user_id(&conn.user_id));
        }
        inner.broadcast_online();
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionId> {
        self.inner.read().by_user.get(user_id).copied()
    }

    /// Deliver `event` to the user's current connection.
    ///
    /// Returns `false` if the user has no connection or it already closed.
    pub fn push(&self, user_id: &str, event: ServerEvent) -> bool {
        let inner = self.inner.read();
        let Some(conn) = inner
            .by_user
            .get(user_id)
            .and_then(|id| inner.connections.get(id))
        else {
            return false;
        };
        conn.sender.send(event).is_ok()
    }

    /// Deliver `event` to every live connection.
    pub fn broadcast(&self, event: ServerEvent) {
        let inner = self.inner.read();
        for conn in inner.connections.values() {
            let _ = conn.sender.send(event.clone());
        }
    }

    /// Online users that allow their status to be shown, sorted.
    pub fn online_users(&self) -> Vec<String> {
        self.inner.read().visible_online()
    }

    /// Follow a change of `show_online_status`. Rebroadcasts when the user
    /// is online and the visible set actually changed.
    pub fn set_visibility(&self, user_id: &str, visible: bool) {
        let mut inner = self.inner.write();
        let changed = if visible {
            inner.hidden.remove(user_id)
        } else {
            inner.hidden.insert(user_id.to_string())
        };
        if changed && inner.by_user.contains_key(user_id) {
            inner.broadcast_online();
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }
}
