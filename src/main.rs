use chat_service::{
    config::Config,
    error::AppError,
    logging, routes,
    services::{InMemoryNotificationSink, StaticTokenProvider},
    state::AppState,
    store::MemoryStore,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let config = Arc::new(Config::from_env()?);

    let store = Arc::new(MemoryStore::new());
    let identity = Arc::new(StaticTokenProvider::from_config(&config));
    let notifications = Arc::new(InMemoryNotificationSink::new());

    let state = AppState::new(
        config.clone(),
        store.clone(),
        store,
        identity,
        notifications,
    );
    let app = routes::build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "chat-service listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::StartServer(format!("bind: {e}")))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(format!("serve: {e}")))?;

    Ok(())
}
