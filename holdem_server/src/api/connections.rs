//! Process-scoped connection registry.
//!
//! Maps user ids to their single live socket. At most one socket per
//! user: a newer connection supersedes the older one, and teardown for
//! a superseded socket must not disturb the newer binding.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<i64, Uuid>>,
}

impl ConnectionRegistry {
    /// Bind a user's live socket, returning the socket it replaced.
    pub async fn bind(&self, user_id: i64, socket_id: Uuid) -> Option<Uuid> {
        self.inner.write().await.insert(user_id, socket_id)
    }

    /// Remove the binding only when `socket_id` is still the live one.
    /// Returns whether the caller owned the current binding.
    pub async fn release(&self, user_id: i64, socket_id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        if inner.get(&user_id) == Some(&socket_id) {
            inner.remove(&user_id);
            true
        } else {
            false
        }
    }

    pub async fn current(&self, user_id: i64) -> Option<Uuid> {
        self.inner.read().await.get(&user_id).copied()
    }
}
