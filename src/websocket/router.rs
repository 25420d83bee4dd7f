use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Logical fan-out group. Conversation channels are joined explicitly
/// (membership-verified by the service), identity channels are auto-joined
/// at registration, topic channels carry ephemeral broadcast traffic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Conversation(Uuid),
    User(Uuid),
    Topic(String),
}

struct Connection {
    user_id: Uuid,
    sender: UnboundedSender<String>,
}

#[derive(Default)]
struct RouterInner {
    connections: HashMap<Uuid, Connection>,
    channels: HashMap<ChannelId, HashSet<Uuid>>,
    memberships: HashMap<Uuid, HashSet<ChannelId>>,
}

impl RouterInner {
    fn join(&mut self, connection_id: Uuid, channel: ChannelId) {
        self.channels
            .entry(channel.clone())
            .or_default()
            .insert(connection_id);
        self.memberships
            .entry(connection_id)
            .or_default()
            .insert(channel);
    }

    fn leave(&mut self, connection_id: Uuid, channel: &ChannelId) {
        if let Some(members) = self.channels.get_mut(channel) {
            members.remove(&connection_id);
            if members.is_empty() {
                self.channels.remove(channel);
            }
        }
        if let Some(channels) = self.memberships.get_mut(&connection_id) {
            channels.remove(channel);
        }
    }
}

/// Routes serialized event payloads to connections grouped into channels.
#[derive(Clone, Default)]
pub struct ChannelRouter {
    inner: Arc<RwLock<RouterInner>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection and auto-joins its identity channel, so targeted
    /// delivery works independent of conversation subscriptions.
    pub async fn register(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        sender: UnboundedSender<String>,
    ) {
        let mut inner = self.inner.write().await;
        inner
            .connections
            .insert(connection_id, Connection { user_id, sender });
        inner.join(connection_id, ChannelId::User(user_id));
    }

    pub async fn unregister(&self, connection_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(channels) = inner.memberships.remove(&connection_id) {
            for channel in channels {
                if let Some(members) = inner.channels.get_mut(&channel) {
                    members.remove(&connection_id);
                    if members.is_empty() {
                        inner.channels.remove(&channel);
                    }
                }
            }
        }
        inner.connections.remove(&connection_id);
    }

    pub async fn join(&self, connection_id: Uuid, channel: ChannelId) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.connections.contains_key(&connection_id) {
            return Err(AppError::NotFound);
        }
        inner.join(connection_id, channel);
        Ok(())
    }

    pub async fn leave(&self, connection_id: Uuid, channel: &ChannelId) {
        let mut inner = self.inner.write().await;
        inner.leave(connection_id, channel);
    }

    pub async fn is_member(&self, connection_id: Uuid, channel: &ChannelId) -> bool {
        let inner = self.inner.read().await;
        inner
            .channels
            .get(channel)
            .is_some_and(|members| members.contains(&connection_id))
    }

    /// Sends the payload to every current member of the channel. Dead
    /// senders are pruned. Returns the number of handles reached; zero for
    /// an empty channel is a no-op at this layer.
    pub async fn emit_to_channel(&self, channel: &ChannelId, payload: &str) -> usize {
        let mut inner = self.inner.write().await;
        let Some(members) = inner.channels.get(channel) else {
            return 0;
        };
        let members: Vec<Uuid> = members.iter().copied().collect();
        let mut reached = 0;
        let mut dead = Vec::new();
        for connection_id in members {
            match inner.connections.get(&connection_id) {
                Some(conn) if conn.sender.send(payload.to_string()).is_ok() => reached += 1,
                _ => dead.push(connection_id),
            }
        }
        for connection_id in dead {
            if let Some(channels) = inner.memberships.remove(&connection_id) {
                for ch in channels {
                    if let Some(members) = inner.channels.get_mut(&ch) {
                        members.remove(&connection_id);
                        if members.is_empty() {
                            inner.channels.remove(&ch);
                        }
                    }
                }
            }
            inner.connections.remove(&connection_id);
        }
        reached
    }

    /// Reaches every active handle of the identity regardless of what
    /// channels those connections joined.
    pub async fn emit_to_user(&self, user_id: Uuid, payload: &str) -> usize {
        self.emit_to_channel(&ChannelId::User(user_id), payload).await
    }
}
