use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::guards::User;
use crate::models::Message;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReactRequest {
    pub emoji: String,
}

/// POST /messages/{id}/reactions
/// Replaces any previous reaction from the caller.
pub async fn add_reaction(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
    Json(body): Json<ReactRequest>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = state.service.add_reaction(user.id, message_id, body.emoji).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// DELETE /messages/{id}/reactions
pub async fn remove_reaction(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
) -> AppResult<Json<Message>> {
    let message = state.service.remove_reaction(user.id, message_id).await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct EditRequest {
    pub content: String,
}

/// PUT /messages/{id}
pub async fn edit_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
    Json(body): Json<EditRequest>,
) -> AppResult<Json<Message>> {
    let message = state.service.edit_message(user.id, message_id, body.content).await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub for_everyone: bool,
}

/// DELETE /messages/{id}?for_everyone=
pub async fn delete_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> AppResult<StatusCode> {
    state
        .service
        .delete_message(user.id, message_id, query.for_everyone)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ForwardRequest {
    pub target_conversation_ids: Vec<Uuid>,
}

/// POST /messages/{id}/forward
pub async fn forward_message(
    State(state): State<AppState>,
    user: User,
    Path(message_id): Path<Uuid>,
    Json(body): Json<ForwardRequest>,
) -> AppResult<(StatusCode, Json<Vec<Message>>)> {
    let created = state
        .service
        .forward_message(user.id, message_id, &body.target_conversation_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

/// GET /search
/// Matches message content and media file names across the caller's
/// conversations.
pub async fn search_messages(
    State(state): State<AppState>,
    user: User,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<Vec<Message>>> {
    let messages = state
        .service
        .search(user.id, &query.q, query.conversation_id)
        .await?;
    Ok(Json(messages))
}
