use crate::state::AppState;
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::json;

pub mod conversations;
use conversations::{
    add_member, create_direct, create_group, get_conversation, get_message_history,
    list_conversations, mark_delivered, mark_read, pin_message, remove_member, send_message,
    unpin_message, update_member_role, update_settings,
};
pub mod messages;
use messages::{
    add_reaction, delete_message, edit_message, forward_message, remove_reaction, search_messages,
};

use crate::websocket::handlers::ws_handler;

async fn metrics() -> String {
    json!({
        "service": "chat-service",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
    .to_string()
}

pub fn build_router(state: AppState) -> Router {
    let introspection = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/metrics", get(metrics));

    let api_v1 = Router::new()
        // Conversations
        .route("/conversations", post(create_direct))
        .route("/conversations", get(list_conversations))
        .route("/conversations/groups", post(create_group))
        .route("/conversations/:id", get(get_conversation))
        .route("/conversations/:id/members", post(add_member))
        .route("/conversations/:id/members/:user_id", delete(remove_member))
        .route("/conversations/:id/members/:user_id", put(update_member_role))
        .route("/conversations/:id/pins", post(pin_message))
        .route("/conversations/:id/pins/:message_id", delete(unpin_message))
        .route("/conversations/:id/settings", put(update_settings))
        .route("/conversations/:id/messages", post(send_message))
        .route("/conversations/:id/messages", get(get_message_history))
        .route("/conversations/:id/read", post(mark_read))
        .route("/conversations/:id/delivered", post(mark_delivered))
        // Messages
        .route("/messages/:id/reactions", post(add_reaction))
        .route("/messages/:id/reactions", delete(remove_reaction))
        .route("/messages/:id", put(edit_message))
        .route("/messages/:id", delete(delete_message))
        .route("/messages/:id/forward", post(forward_message))
        .route("/search", get(search_messages))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::require_identity,
        ));

    Router::new()
        .merge(introspection)
        .route("/ws", get(ws_handler))
        .nest("/api/v1", api_v1)
        .with_state(state)
}
