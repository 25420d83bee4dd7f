pub mod events;
pub mod frames;
pub mod handlers;
pub mod presence;
pub mod router;

pub use presence::PresenceRegistry;
pub use router::{ChannelId, ChannelRouter};
