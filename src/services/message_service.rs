use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageKind, Reaction};
use crate::store::{with_retry, HistoryCursor, MessageStore};

pub struct MessageService {
    store: Arc<dyn MessageStore>,
    config: Arc<Config>,
}

impl MessageService {
    pub fn new(store: Arc<dyn MessageStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    fn attempts(&self) -> u32 {
        self.config.store_retry_attempts
    }

    pub async fn append(&self, message: Message) -> AppResult<Message> {
        with_retry(self.attempts(), {
            let message = message.clone();
            move || self.store.append(message.clone())
        })
        .await
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Message> {
        with_retry(self.attempts(), || self.store.get(id)).await
    }

    /// The message as `viewer` can see it; soft-deleted and expired
    /// messages are absent, not forbidden.
    pub async fn get_visible(&self, viewer: Uuid, id: Uuid) -> AppResult<Message> {
        let message = self.get(id).await?;
        if !message.visible_to(viewer, Utc::now()) {
            return Err(AppError::NotFound);
        }
        Ok(message)
    }

    /// Idempotent set-append; stray ids (unknown, wrong conversation, or
    /// deleted) are skipped so late acks never fail a batch.
    pub async fn mark_delivered(
        &self,
        recipient: Uuid,
        conversation_id: Uuid,
        message_ids: &[Uuid],
    ) -> AppResult<Vec<Message>> {
        self.ack_batch(recipient, conversation_id, message_ids, false)
            .await
    }

    /// Read implies delivered.
    pub async fn mark_read(
        &self,
        recipient: Uuid,
        conversation_id: Uuid,
        message_ids: &[Uuid],
    ) -> AppResult<Vec<Message>> {
        self.ack_batch(recipient, conversation_id, message_ids, true)
            .await
    }

    async fn ack_batch(
        &self,
        recipient: Uuid,
        conversation_id: Uuid,
        message_ids: &[Uuid],
        read: bool,
    ) -> AppResult<Vec<Message>> {
        let mut updated = Vec::new();
        let at = Utc::now();
        for &message_id in message_ids {
            let result = self
                .update(message_id, move |msg| {
                    if msg.conversation_id != conversation_id || msg.deleted {
                        return Err(AppError::NotFound);
                    }
                    if read {
                        msg.mark_read(recipient, at);
                    } else {
                        msg.mark_delivered(recipient, at);
                    }
                    Ok(())
                })
                .await;
            match result {
                Ok(message) => updated.push(message),
                Err(AppError::NotFound) => {
                    tracing::debug!(%message_id, "skipping ack for unknown message");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(updated)
    }

    /// Optimistic insert of the (identity, emoji) pairing. Losing the race
    /// to an identical insert means the other racer already produced the
    /// desired state, so the conflict is absorbed by re-reading. A
    /// different emoji replaces the identity's previous reaction.
    pub async fn add_reaction(
        &self,
        user_id: Uuid,
        message_id: Uuid,
        emoji: String,
    ) -> AppResult<Message> {
        let at = Utc::now();
        let attempt = {
            let emoji = emoji.clone();
            self.update(message_id, move |msg| {
                if msg.deleted {
                    return Err(AppError::NotFound);
                }
                match msg.reaction_of(user_id) {
                    Some(existing) if existing.emoji == emoji => {
                        Err(AppError::Conflict("reaction already recorded".into()))
                    }
                    _ => {
                        msg.reactions.retain(|r| r.user_id != user_id);
                        msg.reactions.push(Reaction {
                            user_id,
                            emoji: emoji.clone(),
                            reacted_at: at,
                        });
                        Ok(())
                    }
                }
            })
            .await
        };
        match attempt {
            Ok(message) => Ok(message),
            Err(AppError::Conflict(_)) => self.get(message_id).await,
            Err(err) => Err(err),
        }
    }

    /// Removing an absent reaction is a no-op success: the other racer won.
    pub async fn remove_reaction(&self, user_id: Uuid, message_id: Uuid) -> AppResult<Message> {
        self.update(message_id, move |msg| {
            if msg.deleted {
                return Err(AppError::NotFound);
            }
            msg.reactions.retain(|r| r.user_id != user_id);
            Ok(())
        })
        .await
    }

    /// Text messages only, original sender only; the replaced content is
    /// appended to the edit history.
    pub async fn edit(&self, actor: Uuid, message_id: Uuid, content: String) -> AppResult<Message> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("message content cannot be empty".into()));
        }
        if content.chars().count() > self.config.max_message_len {
            return Err(AppError::Validation(format!(
                "message content too long (max {})",
                self.config.max_message_len
            )));
        }
        self.update(message_id, move |msg| {
            if msg.deleted {
                return Err(AppError::NotFound);
            }
            if msg.kind != MessageKind::Text {
                return Err(AppError::Validation("only text messages can be edited".into()));
            }
            if msg.sender_id != actor {
                return Err(AppError::Permission(
                    "only the sender can edit a message".into(),
                ));
            }
            let now = Utc::now();
            msg.edit_history.push(crate::models::EditRecord {
                content: std::mem::replace(&mut msg.content, content.clone()),
                edited_at: now,
            });
            msg.edited = true;
            Ok(())
        })
        .await
    }

    /// Soft deletion only. `for_everyone` requires the sender and hides the
    /// message from all participants; otherwise only the actor stops
    /// seeing it. Repeats are idempotent.
    pub async fn soft_delete(
        &self,
        actor: Uuid,
        message_id: Uuid,
        for_everyone: bool,
    ) -> AppResult<Message> {
        self.update(message_id, move |msg| {
            if for_everyone {
                if msg.sender_id != actor {
                    return Err(AppError::Permission(
                        "only the sender can delete for everyone".into(),
                    ));
                }
                if !msg.deleted {
                    msg.deleted = true;
                    msg.deleted_at = Some(Utc::now());
                    msg.deleted_by = Some(actor);
                }
            } else {
                msg.deleted_for.insert(actor);
            }
            Ok(())
        })
        .await
    }

    pub async fn history(
        &self,
        viewer: Uuid,
        conversation_id: Uuid,
        cursor: HistoryCursor,
        limit: Option<usize>,
    ) -> AppResult<Vec<Message>> {
        let limit = limit
            .unwrap_or(self.config.history_page_size)
            .min(self.config.history_page_size * 4);
        with_retry(self.attempts(), || {
            self.store.history(conversation_id, viewer, cursor, limit)
        })
        .await
    }

    pub async fn search(
        &self,
        viewer: Uuid,
        conversation_ids: &[Uuid],
        query: &str,
    ) -> AppResult<Vec<Message>> {
        with_retry(self.attempts(), || {
            self.store
                .search(conversation_ids, viewer, query, self.config.search_result_limit)
        })
        .await
    }

    async fn update<F>(&self, message_id: Uuid, mutation: F) -> AppResult<Message>
    where
        F: Fn(&mut Message) -> AppResult<()> + Send + Clone + 'static,
    {
        with_retry(self.attempts(), move || {
            let mutation = mutation.clone();
            self.store.update(message_id, Box::new(mutation))
        })
        .await
    }
}
