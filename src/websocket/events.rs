//! Realtime event payloads.
//!
//! Every event serializes to a flat JSON object with a `type`, a
//! `timestamp`, and the acting identity, so clients dispatch on one field:
//!
//! ```json
//! {
//!     "type": "message:new",
//!     "timestamp": "2026-08-06T10:30:00Z",
//!     "actor_id": "uuid",
//!     ...
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WsEvent {
    #[serde(rename = "conversation:joined")]
    ConversationJoined { conversation_id: Uuid },

    #[serde(rename = "conversation:left")]
    ConversationLeft { conversation_id: Uuid },

    #[serde(rename = "message:new")]
    MessageNew { message: Message },

    #[serde(rename = "message:status-update")]
    MessageStatusUpdate {
        conversation_id: Uuid,
        message_id: Uuid,
        status: MessageStatus,
        recipient_id: Uuid,
    },

    #[serde(rename = "message:reaction-update")]
    MessageReactionUpdate {
        conversation_id: Uuid,
        message_id: Uuid,
        /// None when the identity's reaction was removed.
        emoji: Option<String>,
    },

    #[serde(rename = "message:edited")]
    MessageEdited {
        conversation_id: Uuid,
        message_id: Uuid,
        content: String,
        edited_at: DateTime<Utc>,
    },

    #[serde(rename = "message:deleted")]
    MessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
        for_everyone: bool,
    },

    #[serde(rename = "typing:start")]
    TypingStart { conversation_id: Uuid },

    #[serde(rename = "typing:stop")]
    TypingStop { conversation_id: Uuid },

    #[serde(rename = "presence:status-change")]
    PresenceStatusChange {
        user_id: Uuid,
        online: bool,
        last_seen: Option<DateTime<Utc>>,
    },
}

impl WsEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConversationJoined { .. } => "conversation:joined",
            Self::ConversationLeft { .. } => "conversation:left",
            Self::MessageNew { .. } => "message:new",
            Self::MessageStatusUpdate { .. } => "message:status-update",
            Self::MessageReactionUpdate { .. } => "message:reaction-update",
            Self::MessageEdited { .. } => "message:edited",
            Self::MessageDeleted { .. } => "message:deleted",
            Self::TypingStart { .. } => "typing:start",
            Self::TypingStop { .. } => "typing:stop",
            Self::PresenceStatusChange { .. } => "presence:status-change",
        }
    }

    /// Flat JSON payload; event-specific fields merge into the envelope.
    /// This is the only place events are serialized.
    pub fn to_payload(&self, actor_id: Uuid) -> Result<String, serde_json::Error> {
        let mut payload = serde_json::json!({
            "type": self.event_type(),
            "timestamp": Utc::now().to_rfc3339(),
            "actor_id": actor_id,
        });

        let fields = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = fields {
            // Serialized form is {"<type name>": {fields...}}.
            for (_, inner) in map {
                if let serde_json::Value::Object(inner) = inner {
                    for (key, value) in inner {
                        payload[key] = value;
                    }
                }
            }
        }

        serde_json::to_string(&payload)
    }
}
