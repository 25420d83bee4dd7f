use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationKind, Message};
use crate::store::{
    ConversationMutation, ConversationStore, HistoryCursor, MessageMutation, MessageStore,
};

#[derive(Default)]
struct Inner {
    conversations: HashMap<Uuid, Conversation>,
    /// canonical (lo, hi) pair -> conversation id; the unique constraint
    /// that keeps direct conversations one-per-pair.
    direct_index: HashMap<(Uuid, Uuid), Uuid>,
    messages: HashMap<Uuid, Message>,
    /// conversation id -> message ids in sequence order.
    timeline: HashMap<Uuid, Vec<Uuid>>,
    sequences: HashMap<Uuid, u64>,
}

/// Process-local store implementing both store traits over one lock, so a
/// message append and its conversation metadata update commit together.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    /// Remaining operations that fail with a transient error before the
    /// store recovers. Lets tests drive the bounded-retry path.
    transient_faults: Arc<AtomicU32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_transient_faults(&self, count: u32) {
        self.transient_faults.store(count, Ordering::SeqCst);
    }

    fn check_fault(&self) -> AppResult<()> {
        let mut remaining = self.transient_faults.load(Ordering::SeqCst);
        while remaining > 0 {
            match self.transient_faults.compare_exchange(
                remaining,
                remaining - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Err(AppError::TransientStore("injected fault".into())),
                Err(actual) => remaining = actual,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert(&self, conversation: Conversation) -> AppResult<Conversation> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        if conversation.kind == ConversationKind::Direct {
            let key = Conversation::direct_key(
                conversation.participants[0],
                conversation.participants[1],
            );
            if inner.direct_index.contains_key(&key) {
                return Err(AppError::Conflict(
                    "direct conversation already exists for this pair".into(),
                ));
            }
            inner.direct_index.insert(key, conversation.id);
        }
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, id: Uuid) -> AppResult<Conversation> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        inner.conversations.get(&id).cloned().ok_or(AppError::NotFound)
    }

    async fn find_direct(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        let key = Conversation::direct_key(a, b);
        Ok(inner
            .direct_index
            .get(&key)
            .and_then(|id| inner.conversations.get(id))
            .cloned())
    }

    async fn update(&self, id: Uuid, mutation: ConversationMutation) -> AppResult<Conversation> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        let current = inner.conversations.get(&id).ok_or(AppError::NotFound)?;
        let mut next = current.clone();
        mutation(&mut next)?;
        inner.conversations.insert(id, next.clone());
        Ok(next)
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        Ok(inner
            .conversations
            .values()
            .filter(|c| c.is_participant(user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, mut message: Message) -> AppResult<Message> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(&message.conversation_id) {
            return Err(AppError::NotFound);
        }
        let seq = inner
            .sequences
            .entry(message.conversation_id)
            .or_insert(0);
        *seq += 1;
        message.sequence = *seq;
        message.created_at = Utc::now();

        let conversation_id = message.conversation_id;
        inner
            .timeline
            .entry(conversation_id)
            .or_default()
            .push(message.id);
        inner.messages.insert(message.id, message.clone());
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.touch(message.id, message.created_at);
        }
        Ok(message)
    }

    async fn get(&self, id: Uuid) -> AppResult<Message> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        inner.messages.get(&id).cloned().ok_or(AppError::NotFound)
    }

    async fn update(&self, id: Uuid, mutation: MessageMutation) -> AppResult<Message> {
        self.check_fault()?;
        let mut inner = self.inner.write().await;
        let current = inner.messages.get(&id).ok_or(AppError::NotFound)?;
        let mut next = current.clone();
        mutation(&mut next)?;
        inner.messages.insert(id, next.clone());
        Ok(next)
    }

    async fn history(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        cursor: HistoryCursor,
        limit: usize,
    ) -> AppResult<Vec<Message>> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        let now = Utc::now();
        let ids = inner.timeline.get(&conversation_id);
        let mut out = Vec::new();
        for id in ids.into_iter().flatten() {
            if out.len() >= limit {
                break;
            }
            let Some(msg) = inner.messages.get(id) else {
                continue;
            };
            if let Some(after) = cursor.after {
                if msg.created_at <= after {
                    continue;
                }
            }
            if let Some(before) = cursor.before {
                if msg.created_at >= before {
                    continue;
                }
            }
            if msg.visible_to(viewer, now) {
                out.push(msg.clone());
            }
        }
        Ok(out)
    }

    async fn search(
        &self,
        conversation_ids: &[Uuid],
        viewer: Uuid,
        query: &str,
        limit: usize,
    ) -> AppResult<Vec<Message>> {
        self.check_fault()?;
        let inner = self.inner.read().await;
        let now = Utc::now();
        let needle = query.to_lowercase();
        let mut hits: Vec<Message> = conversation_ids
            .iter()
            .filter_map(|cid| inner.timeline.get(cid))
            .flatten()
            .filter_map(|id| inner.messages.get(id))
            .filter(|msg| msg.visible_to(viewer, now))
            .filter(|msg| {
                msg.content.to_lowercase().contains(&needle)
                    || msg
                        .media
                        .as_ref()
                        .is_some_and(|m| m.file_name.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits.truncate(limit);
        Ok(hits)
    }
}
