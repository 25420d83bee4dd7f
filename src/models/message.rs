use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    File,
    Audio,
    Location,
    Contact,
}

/// Aggregate delivery state derived from the per-recipient sets.
/// Ordered so that the aggregate can only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub user_id: Uuid,
    pub emoji: String,
    pub reacted_at: DateTime<Utc>,
}

/// Provenance of a forwarded message. Forwarding copies; the original is
/// never touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardInfo {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditRecord {
    pub content: String,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub url: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub kind: MessageKind,
    pub content: String,
    pub media: Option<MediaInfo>,
    pub reply_to: Option<Uuid>,
    pub forwarded_from: Option<ForwardInfo>,
    /// Store-assigned, monotonic within the conversation.
    pub sequence: u64,
    /// recipient -> first ack timestamp; append-only, idempotent.
    pub delivered_to: BTreeMap<Uuid, DateTime<Utc>>,
    pub read_by: BTreeMap<Uuid, DateTime<Utc>>,
    /// At most one entry per user; a new reaction replaces the old one.
    pub reactions: Vec<Reaction>,
    pub edited: bool,
    pub edit_history: Vec<EditRecord>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<Uuid>,
    /// Identities that deleted the message for themselves only.
    pub deleted_for: HashSet<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        kind: MessageKind,
        content: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            kind,
            content,
            media: None,
            reply_to: None,
            forwarded_from: None,
            sequence: 0,
            delivered_to: BTreeMap::new(),
            read_by: BTreeMap::new(),
            reactions: Vec::new(),
            edited: false,
            edit_history: Vec::new(),
            deleted: false,
            deleted_at: None,
            deleted_by: None,
            deleted_for: HashSet::new(),
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Aggregate status: the furthest state any non-sender recipient has
    /// acknowledged. Read implies delivered, so the maximum is monotonic
    /// under idempotent set-appends.
    pub fn status(&self) -> MessageStatus {
        if !self.read_by.is_empty() {
            MessageStatus::Read
        } else if !self.delivered_to.is_empty() {
            MessageStatus::Delivered
        } else {
            MessageStatus::Sent
        }
    }

    /// Marks delivery by a recipient; first timestamp wins on repeats.
    pub fn mark_delivered(&mut self, recipient: Uuid, at: DateTime<Utc>) {
        if recipient == self.sender_id {
            return;
        }
        self.delivered_to.entry(recipient).or_insert(at);
    }

    /// Marks a read ack. Read implies delivered.
    pub fn mark_read(&mut self, recipient: Uuid, at: DateTime<Utc>) {
        if recipient == self.sender_id {
            return;
        }
        self.delivered_to.entry(recipient).or_insert(at);
        self.read_by.entry(recipient).or_insert(at);
    }

    pub fn reaction_of(&self, user_id: Uuid) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.user_id == user_id)
    }

    /// Whether `viewer` can still see this message.
    pub fn visible_to(&self, viewer: Uuid, now: DateTime<Utc>) -> bool {
        if self.deleted || self.deleted_for.contains(&viewer) {
            return false;
        }
        match self.expires_at {
            Some(expiry) => expiry > now,
            None => true,
        }
    }

    pub fn forward_to(&self, target_conversation: Uuid, forwarder: Uuid) -> Message {
        let mut copy = Message::new(target_conversation, forwarder, self.kind, self.content.clone());
        copy.media = self.media.clone();
        copy.forwarded_from = Some(ForwardInfo {
            message_id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
        });
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::new(Uuid::new_v4(), Uuid::new_v4(), MessageKind::Text, "hi".into())
    }

    #[test]
    fn status_progresses_sent_delivered_read() {
        let mut msg = message();
        assert_eq!(msg.status(), MessageStatus::Sent);

        let recipient = Uuid::new_v4();
        msg.mark_delivered(recipient, Utc::now());
        assert_eq!(msg.status(), MessageStatus::Delivered);

        msg.mark_read(recipient, Utc::now());
        assert_eq!(msg.status(), MessageStatus::Read);

        // A late delivery ack never reverts an observed read.
        msg.mark_delivered(recipient, Utc::now());
        assert_eq!(msg.status(), MessageStatus::Read);
    }

    #[test]
    fn read_implies_delivered() {
        let mut msg = message();
        let recipient = Uuid::new_v4();
        msg.mark_read(recipient, Utc::now());
        assert!(msg.delivered_to.contains_key(&recipient));
        assert!(msg.read_by.contains_key(&recipient));
    }

    #[test]
    fn acks_are_idempotent_and_keep_the_first_timestamp() {
        let mut msg = message();
        let recipient = Uuid::new_v4();
        let first = Utc::now();
        msg.mark_read(recipient, first);
        msg.mark_read(recipient, first + chrono::Duration::seconds(5));
        assert_eq!(msg.read_by.len(), 1);
        assert_eq!(msg.read_by[&recipient], first);
    }

    #[test]
    fn sender_acks_are_ignored() {
        let mut msg = message();
        let sender = msg.sender_id;
        msg.mark_read(sender, Utc::now());
        assert_eq!(msg.status(), MessageStatus::Sent);
    }

    #[test]
    fn forward_copies_content_and_records_provenance() {
        let original = message();
        let target = Uuid::new_v4();
        let forwarder = Uuid::new_v4();
        let copy = original.forward_to(target, forwarder);

        assert_ne!(copy.id, original.id);
        assert_eq!(copy.conversation_id, target);
        assert_eq!(copy.sender_id, forwarder);
        assert_eq!(copy.content, original.content);
        let provenance = copy.forwarded_from.unwrap();
        assert_eq!(provenance.message_id, original.id);
        assert_eq!(provenance.conversation_id, original.conversation_id);
        assert_eq!(provenance.sender_id, original.sender_id);
    }

    #[test]
    fn expired_messages_are_invisible() {
        let mut msg = message();
        let viewer = Uuid::new_v4();
        let now = Utc::now();
        assert!(msg.visible_to(viewer, now));
        msg.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(!msg.visible_to(viewer, now));
    }
}
