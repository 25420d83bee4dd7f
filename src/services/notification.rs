use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
}

impl NotificationRequest {
    pub fn new(kind: &str, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            title: title.into(),
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub request: NotificationRequest,
    pub created_at: DateTime<Utc>,
}

/// Downstream notification fan-out. Owned elsewhere; this service only
/// writes to it, and treats every write as fire-and-forget.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn enqueue(&self, recipient_id: Uuid, request: NotificationRequest) -> AppResult<Uuid>;
}

/// Process-local sink used in tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    entries: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn for_recipient(&self, recipient_id: Uuid) -> Vec<Notification> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn enqueue(&self, recipient_id: Uuid, request: NotificationRequest) -> AppResult<Uuid> {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id,
            request,
            created_at: Utc::now(),
        };
        let id = notification.id;
        self.entries.write().await.push(notification);
        Ok(id)
    }
}
