use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{MediaInfo, Message, MessageKind};

/// Frames a connected client may send over the realtime socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join {
        conversation_id: Uuid,
    },
    Leave {
        conversation_id: Uuid,
    },
    Send {
        conversation_id: Uuid,
        content: String,
        #[serde(default)]
        kind: Option<MessageKind>,
        #[serde(default)]
        media: Option<MediaInfo>,
        #[serde(default)]
        reply_to: Option<Uuid>,
        #[serde(default)]
        expires_in_seconds: Option<i64>,
    },
    TypingStart {
        conversation_id: Uuid,
    },
    TypingStop {
        conversation_id: Uuid,
    },
    MarkDelivered {
        conversation_id: Uuid,
        message_ids: Vec<Uuid>,
    },
    MarkRead {
        conversation_id: Uuid,
        message_ids: Vec<Uuid>,
    },
    React {
        message_id: Uuid,
        emoji: String,
    },
    Unreact {
        message_id: Uuid,
    },
    Edit {
        message_id: Uuid,
        content: String,
    },
    Delete {
        message_id: Uuid,
        #[serde(default)]
        for_everyone: bool,
    },
    Forward {
        message_id: Uuid,
        target_conversation_ids: Vec<Uuid>,
    },
    Search {
        query: String,
        #[serde(default)]
        conversation_id: Option<Uuid>,
    },
}

/// Direct replies to the requesting connection. Fan-out events use
/// [`super::events::WsEvent`] payloads instead.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Error {
        code: String,
        message: String,
    },
    SearchResults {
        query: String,
        messages: Vec<Message>,
    },
    Forwarded {
        message_ids: Vec<Uuid>,
    },
}
