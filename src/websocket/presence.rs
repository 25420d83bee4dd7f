use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct PresenceInner {
    /// identity -> active connection handles. An identity is online while
    /// this set is non-empty (multi-device).
    online: HashMap<Uuid, HashSet<Uuid>>,
    last_seen: HashMap<Uuid, DateTime<Utc>>,
}

/// Process-local presence registry. Entries are added by connect handlers
/// and removed by disconnect handlers of this process only; multi-process
/// deployments would need an external registry.
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<PresenceInner>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection handle. Returns true when this was the
    /// identity's first handle, i.e. it just came online.
    pub async fn register(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        let handles = inner.online.entry(user_id).or_default();
        let was_offline = handles.is_empty();
        handles.insert(connection_id);
        was_offline
    }

    /// Removes a connection handle. Returns the recorded last-seen time
    /// when the identity's handle set emptied, i.e. it just went offline.
    pub async fn unregister(&self, user_id: Uuid, connection_id: Uuid) -> Option<DateTime<Utc>> {
        let mut inner = self.inner.write().await;
        let went_offline = match inner.online.get_mut(&user_id) {
            Some(handles) => {
                handles.remove(&connection_id);
                handles.is_empty()
            }
            None => false,
        };
        if went_offline {
            inner.online.remove(&user_id);
            let at = Utc::now();
            inner.last_seen.insert(user_id, at);
            Some(at)
        } else {
            None
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let inner = self.inner.read().await;
        inner.online.get(&user_id).is_some_and(|h| !h.is_empty())
    }

    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let inner = self.inner.read().await;
        inner.online.get(&user_id).map_or(0, |h| h.len())
    }

    pub async fn last_seen(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().await;
        inner.last_seen.get(&user_id).copied()
    }
}
