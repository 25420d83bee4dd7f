pub mod conversation;
pub mod message;

pub use conversation::{Conversation, ConversationKind, ParticipantSettings, PinnedMessage};
pub use message::{
    EditRecord, ForwardInfo, MediaInfo, Message, MessageKind, MessageStatus, Reaction,
};
