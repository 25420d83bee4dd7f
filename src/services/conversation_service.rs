use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ParticipantSettings};
use crate::store::{with_retry, ConversationStore};

/// Per-actor settings patch. `None` leaves a flag untouched. The
/// group-wide `admins_only_posting` toggle requires admin rights.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct SettingsPatch {
    pub muted: Option<bool>,
    pub pinned: Option<bool>,
    pub archived: Option<bool>,
    pub blocked: Option<bool>,
    pub admins_only_posting: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub include_archived: bool,
    pub search: Option<String>,
    /// 1-based page index.
    pub page: usize,
    pub per_page: usize,
}

pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    config: Arc<Config>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ConversationStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    fn attempts(&self) -> u32 {
        self.config.store_retry_attempts
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Conversation> {
        with_retry(self.attempts(), || self.store.get(id)).await
    }

    /// Conversation as visible to `actor`; non-participants get NotFound
    /// rather than a membership probe.
    pub async fn get_for(&self, actor: Uuid, id: Uuid) -> AppResult<Conversation> {
        let conversation = self.get(id).await?;
        if !conversation.is_participant(actor) {
            return Err(AppError::NotFound);
        }
        Ok(conversation)
    }

    /// Idempotent under concurrency: losing a creation race downgrades to
    /// reading the winner's row.
    pub async fn find_or_create_direct(&self, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        if a == b {
            return Err(AppError::Validation(
                "a direct conversation needs two distinct participants".into(),
            ));
        }
        if let Some(existing) = with_retry(self.attempts(), || self.store.find_direct(a, b)).await?
        {
            return Ok(existing);
        }
        let candidate = Conversation::direct(a, b);
        let inserted = with_retry(self.attempts(), {
            let candidate = candidate.clone();
            move || self.store.insert(candidate.clone())
        })
        .await;
        match inserted {
            Ok(created) => Ok(created),
            Err(AppError::Conflict(_)) => {
                with_retry(self.attempts(), || self.store.find_direct(a, b))
                    .await?
                    .ok_or(AppError::NotFound)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn create_group(
        &self,
        creator: Uuid,
        participants: Vec<Uuid>,
        name: String,
        description: Option<String>,
    ) -> AppResult<Conversation> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("group name cannot be empty".into()));
        }
        if name.len() > self.config.max_group_name_len {
            return Err(AppError::Validation(format!(
                "group name too long (max {})",
                self.config.max_group_name_len
            )));
        }
        if let Some(ref desc) = description {
            if desc.len() > self.config.max_group_description_len {
                return Err(AppError::Validation(format!(
                    "group description too long (max {})",
                    self.config.max_group_description_len
                )));
            }
        }

        let mut members = vec![creator];
        for id in participants {
            if !members.contains(&id) {
                members.push(id);
            }
        }
        if members.len() < 3 {
            return Err(AppError::Validation(
                "a group conversation needs at least 3 participants".into(),
            ));
        }

        let conversation = Conversation::group(creator, members, name, description);
        with_retry(self.attempts(), {
            let conversation = conversation.clone();
            move || self.store.insert(conversation.clone())
        })
        .await
    }

    pub async fn add_participant(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        target: Uuid,
    ) -> AppResult<Conversation> {
        self.update(conversation_id, move |conv| {
            require_group(conv)?;
            require_admin(conv, actor)?;
            if conv.is_participant(target) {
                return Err(AppError::Conflict("already a participant".into()));
            }
            conv.participants.push(target);
            Ok(())
        })
        .await
    }

    /// Removal strips admin status; the last admin cannot be removed while
    /// other participants remain. Self-removal (leaving) follows the same
    /// rules without requiring admin rights.
    pub async fn remove_participant(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        target: Uuid,
    ) -> AppResult<Conversation> {
        self.update(conversation_id, move |conv| {
            require_group(conv)?;
            if actor != target {
                require_admin(conv, actor)?;
            } else if !conv.is_participant(actor) {
                return Err(AppError::NotFound);
            }
            if !conv.is_participant(target) {
                return Err(AppError::NotFound);
            }
            if conv.is_admin(target) && conv.admins.len() == 1 && conv.participants.len() > 1 {
                return Err(AppError::Permission(
                    "cannot remove the last admin of a group".into(),
                ));
            }
            conv.participants.retain(|id| *id != target);
            conv.admins.retain(|id| *id != target);
            conv.settings.remove(&target);
            Ok(())
        })
        .await
    }

    pub async fn add_admin(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        target: Uuid,
    ) -> AppResult<Conversation> {
        self.update(conversation_id, move |conv| {
            require_group(conv)?;
            require_admin(conv, actor)?;
            if !conv.is_participant(target) {
                return Err(AppError::Validation("target is not a participant".into()));
            }
            if conv.is_admin(target) {
                return Err(AppError::Conflict("already an admin".into()));
            }
            conv.admins.push(target);
            Ok(())
        })
        .await
    }

    pub async fn remove_admin(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        target: Uuid,
    ) -> AppResult<Conversation> {
        self.update(conversation_id, move |conv| {
            require_group(conv)?;
            require_admin(conv, actor)?;
            if !conv.is_admin(target) {
                return Err(AppError::NotFound);
            }
            if conv.admins.len() == 1 {
                return Err(AppError::Permission(
                    "cannot remove the last admin of a group".into(),
                ));
            }
            conv.admins.retain(|id| *id != target);
            Ok(())
        })
        .await
    }

    /// The caller is responsible for checking that `message_id` names a
    /// message of this conversation that the actor can see.
    pub async fn pin_message(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Conversation> {
        self.update(conversation_id, move |conv| {
            require_pin_rights(conv, actor)?;
            if conv.is_pinned_message(message_id) {
                return Err(AppError::Conflict("message already pinned".into()));
            }
            conv.pinned_messages.push(crate::models::PinnedMessage {
                message_id,
                pinned_by: actor,
                pinned_at: chrono::Utc::now(),
            });
            Ok(())
        })
        .await
    }

    pub async fn unpin_message(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Conversation> {
        self.update(conversation_id, move |conv| {
            require_pin_rights(conv, actor)?;
            if !conv.is_pinned_message(message_id) {
                return Err(AppError::NotFound);
            }
            conv.pinned_messages.retain(|p| p.message_id != message_id);
            Ok(())
        })
        .await
    }

    pub async fn update_settings(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        patch: SettingsPatch,
    ) -> AppResult<Conversation> {
        self.update(conversation_id, move |conv| {
            if !conv.is_participant(actor) {
                return Err(AppError::NotFound);
            }
            if let Some(admins_only) = patch.admins_only_posting {
                require_group(conv)?;
                require_admin(conv, actor)?;
                conv.admins_only_posting = admins_only;
            }
            let settings = conv.settings.entry(actor).or_insert_with(ParticipantSettings::default);
            if let Some(muted) = patch.muted {
                settings.muted = muted;
            }
            if let Some(pinned) = patch.pinned {
                settings.pinned = pinned;
            }
            if let Some(archived) = patch.archived {
                settings.archived = archived;
            }
            if let Some(blocked) = patch.blocked {
                settings.blocked = blocked;
            }
            Ok(())
        })
        .await
    }

    /// Conversations visible to the actor, pinned-by-the-actor first, then
    /// by most recent activity.
    pub async fn list_for(&self, actor: Uuid, opts: ListOptions) -> AppResult<Vec<Conversation>> {
        let mut conversations =
            with_retry(self.attempts(), || self.store.list_for_user(actor)).await?;

        if !opts.include_archived {
            conversations.retain(|c| !c.settings_for(actor).archived);
        }
        if let Some(ref query) = opts.search {
            let needle = query.to_lowercase();
            conversations.retain(|c| {
                c.name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&needle))
                    || c.description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            });
        }

        conversations.sort_by(|a, b| {
            let a_pinned = a.settings_for(actor).pinned;
            let b_pinned = b.settings_for(actor).pinned;
            b_pinned
                .cmp(&a_pinned)
                .then(b.last_activity_at.cmp(&a.last_activity_at))
        });

        let per_page = if opts.per_page == 0 {
            self.config.history_page_size
        } else {
            opts.per_page
        };
        let page = opts.page.max(1);
        let start = (page - 1).saturating_mul(per_page);
        Ok(conversations
            .into_iter()
            .skip(start)
            .take(per_page)
            .collect())
    }

    async fn update<F>(&self, conversation_id: Uuid, mutation: F) -> AppResult<Conversation>
    where
        F: Fn(&mut Conversation) -> AppResult<()> + Send + Clone + 'static,
    {
        with_retry(self.attempts(), move || {
            let mutation = mutation.clone();
            self.store.update(conversation_id, Box::new(mutation))
        })
        .await
    }
}

fn require_group(conv: &Conversation) -> AppResult<()> {
    if !conv.is_group() {
        return Err(AppError::Validation(
            "direct conversations have fixed membership".into(),
        ));
    }
    Ok(())
}

fn require_admin(conv: &Conversation, actor: Uuid) -> AppResult<()> {
    if !conv.is_participant(actor) {
        return Err(AppError::NotFound);
    }
    if !conv.is_admin(actor) {
        return Err(AppError::Permission("admin rights required".into()));
    }
    Ok(())
}

/// Pinning needs participation everywhere and admin rights in groups.
fn require_pin_rights(conv: &Conversation, actor: Uuid) -> AppResult<()> {
    if !conv.is_participant(actor) {
        return Err(AppError::NotFound);
    }
    if conv.is_group() && !conv.is_admin(actor) {
        return Err(AppError::Permission("admin rights required".into()));
    }
    Ok(())
}
