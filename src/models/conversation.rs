use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationKind {
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "group")]
    Group,
}

/// Per-participant, self-scoped conversation settings. Each flag is
/// independent of the others and of every other participant's flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSettings {
    pub muted: bool,
    pub pinned: bool,
    pub archived: bool,
    pub blocked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnedMessage {
    pub message_id: Uuid,
    pub pinned_by: Uuid,
    pub pinned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub creator_id: Uuid,
    /// Deduplicated; for direct conversations always the canonical sorted pair.
    pub participants: Vec<Uuid>,
    /// Non-empty for groups while participants remain. Empty for direct.
    pub admins: Vec<Uuid>,
    /// Group-wide restriction: only admins may send.
    pub admins_only_posting: bool,
    pub settings: HashMap<Uuid, ParticipantSettings>,
    pub pinned_messages: Vec<PinnedMessage>,
    pub last_message_id: Option<Uuid>,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Canonical key for a direct pair; at most one direct conversation
    /// exists per unordered pair.
    pub fn direct_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn direct(a: Uuid, b: Uuid) -> Self {
        let (lo, hi) = Self::direct_key(a, b);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Direct,
            name: None,
            description: None,
            avatar_url: None,
            creator_id: a,
            participants: vec![lo, hi],
            admins: Vec::new(),
            admins_only_posting: false,
            settings: HashMap::new(),
            pinned_messages: Vec::new(),
            last_message_id: None,
            last_activity_at: now,
            created_at: now,
        }
    }

    pub fn group(
        creator_id: Uuid,
        participants: Vec<Uuid>,
        name: String,
        description: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Group,
            name: Some(name),
            description,
            avatar_url: None,
            creator_id,
            participants,
            admins: vec![creator_id],
            admins_only_posting: false,
            settings: HashMap::new(),
            pinned_messages: Vec::new(),
            last_message_id: None,
            last_activity_at: now,
            created_at: now,
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.admins.contains(&user_id)
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConversationKind::Group
    }

    pub fn settings_for(&self, user_id: Uuid) -> ParticipantSettings {
        self.settings.get(&user_id).copied().unwrap_or_default()
    }

    pub fn is_pinned_message(&self, message_id: Uuid) -> bool {
        self.pinned_messages
            .iter()
            .any(|p| p.message_id == message_id)
    }

    pub fn touch(&mut self, message_id: Uuid, at: DateTime<Utc>) {
        self.last_message_id = Some(message_id);
        self.last_activity_at = at;
    }
}
