#![allow(dead_code)]

use std::sync::Arc;
use uuid::Uuid;

use chat_service::config::Config;
use chat_service::routes;
use chat_service::services::{InMemoryNotificationSink, StaticTokenProvider};
use chat_service::state::AppState;
use chat_service::store::MemoryStore;

pub struct TestEnv {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<InMemoryNotificationSink>,
}

pub fn test_env() -> TestEnv {
    test_env_with_tokens(&[])
}

pub fn test_env_with_tokens(tokens: &[(&str, Uuid)]) -> TestEnv {
    let config = Arc::new(Config::default());
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(InMemoryNotificationSink::new());
    let mut identity = StaticTokenProvider::default();
    for (token, user_id) in tokens {
        identity = identity.with_token(*token, *user_id);
    }
    let state = AppState::new(
        config,
        store.clone(),
        store.clone(),
        Arc::new(identity),
        sink.clone(),
    );
    TestEnv { state, store, sink }
}

pub fn text_message(content: &str) -> chat_service::services::SendMessageRequest {
    chat_service::services::SendMessageRequest {
        content: content.into(),
        kind: None,
        media: None,
        reply_to: None,
        expires_in_seconds: None,
    }
}

/// Serves the router on an ephemeral port and returns the base URL.
pub async fn spawn_server(state: AppState) -> String {
    let app = routes::build_router(state);
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}:{}", addr.ip(), addr.port())
}
