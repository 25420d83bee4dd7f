use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message};

pub mod memory;

pub use memory::MemoryStore;

/// Mutation applied under the store's single-entity atomicity guarantee.
/// A failing mutation leaves the entity untouched.
pub type ConversationMutation = Box<dyn FnOnce(&mut Conversation) -> AppResult<()> + Send>;
pub type MessageMutation = Box<dyn FnOnce(&mut Message) -> AppResult<()> + Send>;

/// Chronological range cursor over a conversation's history. Results are
/// always returned in ascending creation order.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryCursor {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persists a new conversation. Inserting a second direct conversation
    /// for the same canonical pair fails with `Conflict`.
    async fn insert(&self, conversation: Conversation) -> AppResult<Conversation>;

    async fn get(&self, id: Uuid) -> AppResult<Conversation>;

    async fn find_direct(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>>;

    /// Atomic update-with-predicate: the mutation observes and modifies the
    /// current entity state under the store's write lock; if it errors,
    /// nothing is persisted.
    async fn update(&self, id: Uuid, mutation: ConversationMutation) -> AppResult<Conversation>;

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends a message, assigning it the conversation's next monotonic
    /// sequence, and updates the owning conversation's last-message
    /// metadata in the same atomic step.
    async fn append(&self, message: Message) -> AppResult<Message>;

    async fn get(&self, id: Uuid) -> AppResult<Message>;

    async fn update(&self, id: Uuid, mutation: MessageMutation) -> AppResult<Message>;

    /// Ascending range query over one conversation, filtered to what
    /// `viewer` can see.
    async fn history(
        &self,
        conversation_id: Uuid,
        viewer: Uuid,
        cursor: HistoryCursor,
        limit: usize,
    ) -> AppResult<Vec<Message>>;

    /// Substring match on content and media file name across the given
    /// conversations, most recent first.
    async fn search(
        &self,
        conversation_ids: &[Uuid],
        viewer: Uuid,
        query: &str,
        limit: usize,
    ) -> AppResult<Vec<Message>>;
}

/// Bounded retry at the store boundary. Transient failures are retried up
/// to `attempts` times; definitive errors pass through immediately.
pub async fn with_retry<T, F, Fut>(attempts: u32, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut last = None;
    for attempt in 1..=attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                tracing::warn!(attempt, error = %err, "transient store failure, retrying");
                last = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last.unwrap_or_else(|| AppError::TransientStore("retries exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn with_retry_recovers_from_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::TransientStore("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_surfaces_exhaustion() {
        let result: AppResult<()> = with_retry(2, || async {
            Err(AppError::TransientStore("down".into()))
        })
        .await;
        assert!(matches!(result, Err(AppError::TransientStore(_))));
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_definitive_errors() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = with_retry(5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::NotFound) }
        })
        .await;
        assert!(matches!(result, Err(AppError::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
