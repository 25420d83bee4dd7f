use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message, MessageKind};
use crate::services::conversation_service::{ConversationService, ListOptions, SettingsPatch};
use crate::services::message_service::MessageService;
use crate::services::notification::{NotificationRequest, NotificationSink};
use crate::store::HistoryCursor;
use crate::websocket::events::WsEvent;
use crate::websocket::presence::PresenceRegistry;
use crate::websocket::router::{ChannelId, ChannelRouter};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub media: Option<crate::models::MediaInfo>,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub expires_in_seconds: Option<i64>,
}

/// Single entry point for every mutating operation: authorize against the
/// conversation/message invariants, mutate the store, emit events to the
/// joined connections, and inform the notification sink for offline
/// recipients.
pub struct MessagingService {
    conversations: Arc<ConversationService>,
    messages: Arc<MessageService>,
    router: ChannelRouter,
    presence: PresenceRegistry,
    notifications: Arc<dyn NotificationSink>,
    config: Arc<Config>,
}

impl MessagingService {
    pub fn new(
        conversations: Arc<ConversationService>,
        messages: Arc<MessageService>,
        router: ChannelRouter,
        presence: PresenceRegistry,
        notifications: Arc<dyn NotificationSink>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            conversations,
            messages,
            router,
            presence,
            notifications,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Channel membership
    // ------------------------------------------------------------------

    /// Joins the connection to the conversation channel after verifying
    /// membership. Unauthorized joins are an explicit error, never a
    /// silent no-op.
    pub async fn join_conversation(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = self.conversations.get(conversation_id).await?;
        if !conversation.is_participant(user_id) {
            return Err(AppError::Permission(
                "not a participant of this conversation".into(),
            ));
        }
        self.router
            .join(connection_id, ChannelId::Conversation(conversation_id))
            .await?;
        Ok(conversation)
    }

    pub async fn leave_conversation(&self, connection_id: Uuid, conversation_id: Uuid) {
        self.router
            .leave(connection_id, &ChannelId::Conversation(conversation_id))
            .await;
    }

    // ------------------------------------------------------------------
    // Conversation management
    // ------------------------------------------------------------------

    pub async fn find_or_create_direct(&self, actor: Uuid, peer: Uuid) -> AppResult<Conversation> {
        self.conversations.find_or_create_direct(actor, peer).await
    }

    pub async fn create_group(
        &self,
        creator: Uuid,
        participants: Vec<Uuid>,
        name: String,
        description: Option<String>,
    ) -> AppResult<Conversation> {
        let conversation = self
            .conversations
            .create_group(creator, participants, name, description)
            .await?;
        let title = conversation.name.clone().unwrap_or_default();
        for &participant in &conversation.participants {
            if participant != creator {
                self.notify(
                    participant,
                    NotificationRequest::new("group", title.clone(), "You were added to a group")
                        .with_data(serde_json::json!({ "conversation_id": conversation.id })),
                )
                .await;
            }
        }
        Ok(conversation)
    }

    pub async fn add_participant(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        target: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = self
            .conversations
            .add_participant(actor, conversation_id, target)
            .await?;
        self.notify(
            target,
            NotificationRequest::new(
                "group",
                conversation.name.clone().unwrap_or_default(),
                "You were added to a group",
            )
            .with_data(serde_json::json!({ "conversation_id": conversation.id })),
        )
        .await;
        Ok(conversation)
    }

    pub async fn remove_participant(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        target: Uuid,
    ) -> AppResult<Conversation> {
        self.conversations
            .remove_participant(actor, conversation_id, target)
            .await
    }

    pub async fn add_admin(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        target: Uuid,
    ) -> AppResult<Conversation> {
        self.conversations.add_admin(actor, conversation_id, target).await
    }

    pub async fn remove_admin(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        target: Uuid,
    ) -> AppResult<Conversation> {
        self.conversations
            .remove_admin(actor, conversation_id, target)
            .await
    }

    pub async fn pin_message(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Conversation> {
        let message = self.messages.get_visible(actor, message_id).await?;
        if message.conversation_id != conversation_id {
            return Err(AppError::Validation(
                "message does not belong to this conversation".into(),
            ));
        }
        self.conversations
            .pin_message(actor, conversation_id, message_id)
            .await
    }

    pub async fn unpin_message(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Conversation> {
        self.conversations
            .unpin_message(actor, conversation_id, message_id)
            .await
    }

    pub async fn update_settings(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        patch: SettingsPatch,
    ) -> AppResult<Conversation> {
        self.conversations
            .update_settings(actor, conversation_id, patch)
            .await
    }

    pub async fn list_conversations(
        &self,
        actor: Uuid,
        opts: ListOptions,
    ) -> AppResult<Vec<Conversation>> {
        self.conversations.list_for(actor, opts).await
    }

    pub async fn get_conversation(&self, actor: Uuid, id: Uuid) -> AppResult<Conversation> {
        self.conversations.get_for(actor, id).await
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub async fn send_message(
        &self,
        sender: Uuid,
        conversation_id: Uuid,
        request: SendMessageRequest,
    ) -> AppResult<Message> {
        let kind = request.kind.unwrap_or(MessageKind::Text);
        self.validate_content(&request.content, kind, request.media.as_ref())?;

        let conversation = self.conversations.get(conversation_id).await?;
        authorize_send(&conversation, sender)?;

        if let Some(reply_to) = request.reply_to {
            let parent = self.messages.get_visible(sender, reply_to).await?;
            if parent.conversation_id != conversation_id {
                return Err(AppError::Validation(
                    "reply target belongs to another conversation".into(),
                ));
            }
        }

        let mut message = Message::new(conversation_id, sender, kind, request.content);
        message.media = request.media;
        message.reply_to = request.reply_to;
        if let Some(secs) = request.expires_in_seconds {
            if secs <= 0 {
                return Err(AppError::Validation("expiry must be in the future".into()));
            }
            message.expires_at = Some(Utc::now() + Duration::seconds(secs));
        }

        let message = self.messages.append(message).await?;

        self.emit(
            &ChannelId::Conversation(conversation_id),
            sender,
            &WsEvent::MessageNew {
                message: message.clone(),
            },
        )
        .await;
        self.notify_offline_recipients(&conversation, sender, &message)
            .await;

        Ok(message)
    }

    pub async fn mark_delivered(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        message_ids: &[Uuid],
    ) -> AppResult<Vec<Message>> {
        self.ack(actor, conversation_id, message_ids, false).await
    }

    pub async fn mark_read(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        message_ids: &[Uuid],
    ) -> AppResult<Vec<Message>> {
        self.ack(actor, conversation_id, message_ids, true).await
    }

    async fn ack(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        message_ids: &[Uuid],
        read: bool,
    ) -> AppResult<Vec<Message>> {
        let conversation = self.conversations.get(conversation_id).await?;
        if !conversation.is_participant(actor) {
            return Err(AppError::Permission(
                "not a participant of this conversation".into(),
            ));
        }
        let updated = if read {
            self.messages.mark_read(actor, conversation_id, message_ids).await?
        } else {
            self.messages
                .mark_delivered(actor, conversation_id, message_ids)
                .await?
        };
        for message in &updated {
            self.emit(
                &ChannelId::Conversation(conversation_id),
                actor,
                &WsEvent::MessageStatusUpdate {
                    conversation_id,
                    message_id: message.id,
                    status: message.status(),
                    recipient_id: actor,
                },
            )
            .await;
        }
        Ok(updated)
    }

    pub async fn add_reaction(
        &self,
        actor: Uuid,
        message_id: Uuid,
        emoji: String,
    ) -> AppResult<Message> {
        if emoji.is_empty() || emoji.chars().count() > 16 {
            return Err(AppError::Validation("invalid reaction".into()));
        }
        let message = self.messages.get_visible(actor, message_id).await?;
        let conversation = self.conversations.get(message.conversation_id).await?;
        if !conversation.is_participant(actor) {
            return Err(AppError::Permission(
                "not a participant of this conversation".into(),
            ));
        }

        let updated = self
            .messages
            .add_reaction(actor, message_id, emoji.clone())
            .await?;
        self.emit(
            &ChannelId::Conversation(updated.conversation_id),
            actor,
            &WsEvent::MessageReactionUpdate {
                conversation_id: updated.conversation_id,
                message_id,
                emoji: Some(emoji),
            },
        )
        .await;

        if updated.sender_id != actor && !self.presence.is_online(updated.sender_id).await {
            self.notify(
                updated.sender_id,
                NotificationRequest::new("reaction", "New reaction", "Someone reacted to your message")
                    .with_data(serde_json::json!({
                        "conversation_id": updated.conversation_id,
                        "message_id": message_id,
                    })),
            )
            .await;
        }
        Ok(updated)
    }

    pub async fn remove_reaction(&self, actor: Uuid, message_id: Uuid) -> AppResult<Message> {
        let message = self.messages.get_visible(actor, message_id).await?;
        let conversation = self.conversations.get(message.conversation_id).await?;
        if !conversation.is_participant(actor) {
            return Err(AppError::Permission(
                "not a participant of this conversation".into(),
            ));
        }
        let updated = self.messages.remove_reaction(actor, message_id).await?;
        self.emit(
            &ChannelId::Conversation(updated.conversation_id),
            actor,
            &WsEvent::MessageReactionUpdate {
                conversation_id: updated.conversation_id,
                message_id,
                emoji: None,
            },
        )
        .await;
        Ok(updated)
    }

    pub async fn edit_message(
        &self,
        actor: Uuid,
        message_id: Uuid,
        content: String,
    ) -> AppResult<Message> {
        let updated = self.messages.edit(actor, message_id, content).await?;
        self.emit(
            &ChannelId::Conversation(updated.conversation_id),
            actor,
            &WsEvent::MessageEdited {
                conversation_id: updated.conversation_id,
                message_id,
                content: updated.content.clone(),
                edited_at: updated
                    .edit_history
                    .last()
                    .map(|e| e.edited_at)
                    .unwrap_or_else(Utc::now),
            },
        )
        .await;
        Ok(updated)
    }

    pub async fn delete_message(
        &self,
        actor: Uuid,
        message_id: Uuid,
        for_everyone: bool,
    ) -> AppResult<Message> {
        let message = self.messages.get_visible(actor, message_id).await?;
        let conversation = self.conversations.get(message.conversation_id).await?;
        if !conversation.is_participant(actor) {
            return Err(AppError::Permission(
                "not a participant of this conversation".into(),
            ));
        }

        let updated = self
            .messages
            .soft_delete(actor, message_id, for_everyone)
            .await?;
        let event = WsEvent::MessageDeleted {
            conversation_id: updated.conversation_id,
            message_id,
            for_everyone,
        };
        if for_everyone {
            self.emit(&ChannelId::Conversation(updated.conversation_id), actor, &event)
                .await;
        } else {
            // Delete-for-me only concerns the actor's other devices.
            self.emit_to_user(actor, actor, &event).await;
        }
        Ok(updated)
    }

    /// Creates sibling messages carrying forward provenance; the original
    /// is never mutated. All targets are authorized before the first copy
    /// is persisted.
    pub async fn forward_message(
        &self,
        actor: Uuid,
        message_id: Uuid,
        target_conversation_ids: &[Uuid],
    ) -> AppResult<Vec<Message>> {
        if target_conversation_ids.is_empty() {
            return Err(AppError::Validation("no forward targets given".into()));
        }
        let source = self.messages.get_visible(actor, message_id).await?;
        let source_conversation = self.conversations.get(source.conversation_id).await?;
        if !source_conversation.is_participant(actor) {
            return Err(AppError::Permission(
                "not a participant of this conversation".into(),
            ));
        }

        let mut targets = Vec::with_capacity(target_conversation_ids.len());
        for &target_id in target_conversation_ids {
            let conversation = self.conversations.get(target_id).await?;
            authorize_send(&conversation, actor)?;
            targets.push(conversation);
        }

        let mut created = Vec::with_capacity(targets.len());
        for conversation in &targets {
            let copy = source.forward_to(conversation.id, actor);
            let message = self.messages.append(copy).await?;
            self.emit(
                &ChannelId::Conversation(conversation.id),
                actor,
                &WsEvent::MessageNew {
                    message: message.clone(),
                },
            )
            .await;
            self.notify_offline_recipients(conversation, actor, &message)
                .await;
            created.push(message);
        }
        Ok(created)
    }

    pub async fn history(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        cursor: HistoryCursor,
        limit: Option<usize>,
    ) -> AppResult<Vec<Message>> {
        let conversation = self.conversations.get_for(actor, conversation_id).await?;
        self.messages
            .history(actor, conversation.id, cursor, limit)
            .await
    }

    /// Searches across the actor's conversations, or one of them.
    pub async fn search(
        &self,
        actor: Uuid,
        query: &str,
        conversation_id: Option<Uuid>,
    ) -> AppResult<Vec<Message>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation("search query cannot be empty".into()));
        }
        let scope: Vec<Uuid> = match conversation_id {
            Some(id) => vec![self.conversations.get_for(actor, id).await?.id],
            None => self
                .conversations
                .list_for(
                    actor,
                    ListOptions {
                        include_archived: true,
                        per_page: usize::MAX,
                        ..Default::default()
                    },
                )
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect(),
        };
        self.messages.search(actor, &scope, query).await
    }

    // ------------------------------------------------------------------
    // Ephemeral traffic
    // ------------------------------------------------------------------

    /// Typing indicators are fan-out only, never persisted.
    pub async fn typing(
        &self,
        actor: Uuid,
        conversation_id: Uuid,
        started: bool,
    ) -> AppResult<()> {
        let conversation = self.conversations.get(conversation_id).await?;
        if !conversation.is_participant(actor) {
            return Err(AppError::Permission(
                "not a participant of this conversation".into(),
            ));
        }
        let event = if started {
            WsEvent::TypingStart { conversation_id }
        } else {
            WsEvent::TypingStop { conversation_id }
        };
        self.emit(&ChannelId::Conversation(conversation_id), actor, &event)
            .await;
        Ok(())
    }

    /// Presence transitions broadcast on the shared presence topic. The
    /// social-graph filter belongs to the surrounding platform.
    pub async fn broadcast_presence(
        &self,
        user_id: Uuid,
        online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) {
        let event = WsEvent::PresenceStatusChange {
            user_id,
            online,
            last_seen,
        };
        match event.to_payload(user_id) {
            Ok(payload) => {
                self.router
                    .emit_to_channel(&ChannelId::Topic("presence".into()), &payload)
                    .await;
            }
            Err(err) => tracing::error!(error = %err, "failed to serialize presence event"),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn validate_content(
        &self,
        content: &str,
        kind: MessageKind,
        media: Option<&crate::models::MediaInfo>,
    ) -> AppResult<()> {
        if content.chars().count() > self.config.max_message_len {
            return Err(AppError::Validation(format!(
                "message content too long (max {})",
                self.config.max_message_len
            )));
        }
        if content.trim().is_empty() {
            if kind == MessageKind::Text || media.is_none() {
                return Err(AppError::Validation("message content cannot be empty".into()));
            }
        }
        Ok(())
    }

    async fn emit(&self, channel: &ChannelId, actor: Uuid, event: &WsEvent) {
        match event.to_payload(actor) {
            Ok(payload) => {
                self.router.emit_to_channel(channel, &payload).await;
            }
            Err(err) => tracing::error!(error = %err, "failed to serialize event"),
        }
    }

    async fn emit_to_user(&self, user_id: Uuid, actor: Uuid, event: &WsEvent) {
        match event.to_payload(actor) {
            Ok(payload) => {
                self.router.emit_to_user(user_id, &payload).await;
            }
            Err(err) => tracing::error!(error = %err, "failed to serialize event"),
        }
    }

    /// Fire-and-forget: sink failures are logged, never surfaced to the
    /// caller that triggered the notification.
    async fn notify(&self, recipient: Uuid, request: NotificationRequest) {
        if let Err(err) = self.notifications.enqueue(recipient, request).await {
            tracing::warn!(%recipient, error = %err, "notification enqueue failed");
        }
    }

    async fn notify_offline_recipients(
        &self,
        conversation: &Conversation,
        sender: Uuid,
        message: &Message,
    ) {
        for &participant in &conversation.participants {
            if participant == sender {
                continue;
            }
            let settings = conversation.settings_for(participant);
            if settings.muted || settings.blocked {
                continue;
            }
            if self.presence.is_online(participant).await {
                continue;
            }
            self.notify(
                participant,
                NotificationRequest::new("message", "New message", "You have a new message")
                    .with_data(serde_json::json!({
                        "conversation_id": conversation.id,
                        "message_id": message.id,
                    })),
            )
            .await;
        }
    }
}

fn authorize_send(conversation: &Conversation, sender: Uuid) -> AppResult<()> {
    if !conversation.is_participant(sender) {
        return Err(AppError::Permission(
            "not a participant of this conversation".into(),
        ));
    }
    if conversation.is_group() && conversation.admins_only_posting && !conversation.is_admin(sender)
    {
        return Err(AppError::Permission("only admins may post here".into()));
    }
    if !conversation.is_group() {
        let peer_blocked = conversation
            .participants
            .iter()
            .any(|&p| p != sender && conversation.settings_for(p).blocked);
        if peer_blocked {
            return Err(AppError::Permission(
                "recipient has blocked this conversation".into(),
            ));
        }
    }
    Ok(())
}
