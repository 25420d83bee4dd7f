use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::guards::User;
use crate::models::Conversation;
use crate::services::conversation_service::{ListOptions, SettingsPatch};
use crate::services::SendMessageRequest;
use crate::state::AppState;
use crate::store::HistoryCursor;

#[derive(Deserialize)]
pub struct CreateDirectRequest {
    pub peer_id: Uuid,
}

/// POST /conversations
/// Finds or creates the direct conversation with the peer.
pub async fn create_direct(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateDirectRequest>,
) -> AppResult<Json<Conversation>> {
    let conversation = state.service.find_or_create_direct(user.id, body.peer_id).await?;
    Ok(Json(conversation))
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub participant_ids: Vec<Uuid>,
}

/// POST /conversations/groups
pub async fn create_group(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateGroupRequest>,
) -> AppResult<(StatusCode, Json<Conversation>)> {
    let conversation = state
        .service
        .create_group(user.id, body.participant_ids, body.name, body.description)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_archived: bool,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub per_page: Option<usize>,
}

/// GET /conversations
/// Pinned-for-the-caller first, then most recent activity.
pub async fn list_conversations(
    State(state): State<AppState>,
    user: User,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Conversation>>> {
    let conversations = state
        .service
        .list_conversations(
            user.id,
            ListOptions {
                include_archived: query.include_archived,
                search: query.search,
                page: query.page.unwrap_or(1),
                per_page: query.per_page.unwrap_or(0),
            },
        )
        .await?;
    Ok(Json(conversations))
}

/// GET /conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Conversation>> {
    let conversation = state.service.get_conversation(user.id, id).await?;
    Ok(Json(conversation))
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

/// POST /conversations/{id}/members
pub async fn add_member(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(body): Json<AddMemberRequest>,
) -> AppResult<Json<Conversation>> {
    let conversation = state.service.add_participant(user.id, id, body.user_id).await?;
    Ok(Json(conversation))
}

/// DELETE /conversations/{id}/members/{user_id}
/// Removing yourself leaves the group.
pub async fn remove_member(
    State(state): State<AppState>,
    user: User,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Conversation>> {
    let conversation = state.service.remove_participant(user.id, id, member_id).await?;
    Ok(Json(conversation))
}

#[derive(Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

/// PUT /conversations/{id}/members/{user_id}
pub async fn update_member_role(
    State(state): State<AppState>,
    user: User,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateRoleRequest>,
) -> AppResult<Json<Conversation>> {
    let conversation = match body.role.as_str() {
        "admin" => state.service.add_admin(user.id, id, member_id).await?,
        "member" => state.service.remove_admin(user.id, id, member_id).await?,
        other => {
            return Err(AppError::Validation(format!("unknown role: {other}")));
        }
    };
    Ok(Json(conversation))
}

#[derive(Deserialize)]
pub struct PinRequest {
    pub message_id: Uuid,
}

/// POST /conversations/{id}/pins
pub async fn pin_message(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(body): Json<PinRequest>,
) -> AppResult<Json<Conversation>> {
    let conversation = state.service.pin_message(user.id, id, body.message_id).await?;
    Ok(Json(conversation))
}

/// DELETE /conversations/{id}/pins/{message_id}
pub async fn unpin_message(
    State(state): State<AppState>,
    user: User,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Conversation>> {
    let conversation = state.service.unpin_message(user.id, id, message_id).await?;
    Ok(Json(conversation))
}

/// PUT /conversations/{id}/settings
pub async fn update_settings(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(patch): Json<SettingsPatch>,
) -> AppResult<Json<Conversation>> {
    let conversation = state.service.update_settings(user.id, id, patch).await?;
    Ok(Json(conversation))
}

/// POST /conversations/{id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> AppResult<(StatusCode, Json<crate::models::Message>)> {
    let message = state.service.send_message(user.id, id, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub after: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub before: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /conversations/{id}/messages
/// Ascending range query over the conversation history.
pub async fn get_message_history(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<crate::models::Message>>> {
    let messages = state
        .service
        .history(
            user.id,
            id,
            HistoryCursor {
                after: query.after,
                before: query.before,
            },
            query.limit,
        )
        .await?;
    Ok(Json(messages))
}

#[derive(Deserialize)]
pub struct AckRequest {
    pub message_ids: Vec<Uuid>,
}

/// POST /conversations/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(body): Json<AckRequest>,
) -> AppResult<Json<Vec<crate::models::Message>>> {
    let updated = state.service.mark_read(user.id, id, &body.message_ids).await?;
    Ok(Json(updated))
}

/// POST /conversations/{id}/delivered
pub async fn mark_delivered(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(body): Json<AckRequest>,
) -> AppResult<Json<Vec<crate::models::Message>>> {
    let updated = state
        .service
        .mark_delivered(user.id, id, &body.message_ids)
        .await?;
    Ok(Json(updated))
}
