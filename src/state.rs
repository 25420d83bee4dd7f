use crate::{
    config::Config,
    services::{
        ConversationService, IdentityProvider, MessageService, MessagingService, NotificationSink,
    },
    store::{ConversationStore, MessageStore},
    websocket::{ChannelRouter, PresenceRegistry},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<MessagingService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub router: ChannelRouter,
    pub presence: PresenceRegistry,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        conversation_store: Arc<dyn ConversationStore>,
        message_store: Arc<dyn MessageStore>,
        identity: Arc<dyn IdentityProvider>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        let router = ChannelRouter::new();
        let presence = PresenceRegistry::new();
        let conversations = Arc::new(ConversationService::new(conversation_store, config.clone()));
        let messages = Arc::new(MessageService::new(message_store, config.clone()));
        let service = Arc::new(MessagingService::new(
            conversations,
            messages,
            router.clone(),
            presence.clone(),
            notifications,
            config.clone(),
        ));
        Self {
            config,
            service,
            identity,
            router,
            presence,
        }
    }
}
