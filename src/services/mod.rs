pub mod conversation_service;
pub mod identity;
pub mod message_service;
pub mod messaging_service;
pub mod notification;

pub use conversation_service::{ConversationService, ListOptions, SettingsPatch};
pub use identity::{IdentityProvider, StaticTokenProvider};
pub use message_service::MessageService;
pub use messaging_service::{MessagingService, SendMessageRequest};
pub use notification::{InMemoryNotificationSink, NotificationRequest, NotificationSink};
