use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::SendMessageRequest;
use crate::state::AppState;
use crate::websocket::events::WsEvent;
use crate::websocket::frames::{ClientFrame, ServerFrame};
use crate::websocket::router::ChannelId;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    match state.identity.authenticate(&params.token).await {
        Ok(user_id) => ws
            .on_upgrade(move |socket| handle_socket(state, user_id, socket))
            .into_response(),
        Err(err) => {
            warn!("websocket connection rejected: invalid credential");
            err.into_response()
        }
    }
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = unbounded_channel::<String>();

    state
        .router
        .register(connection_id, user_id, tx.clone())
        .await;
    // Every connection listens to presence transitions; filtering them to
    // the viewer's social graph is the surrounding platform's job.
    let _ = state
        .router
        .join(connection_id, ChannelId::Topic("presence".into()))
        .await;
    if state.presence.register(user_id, connection_id).await {
        state.service.broadcast_presence(user_id, true, None).await;
    }
    debug!(%user_id, %connection_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(payload) => {
                        if sink.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, user_id, connection_id, &tx, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // A disconnect mid-operation does not roll anything back; events from
    // in-flight mutations still reach the identity's other connections.
    state.router.unregister(connection_id).await;
    if let Some(last_seen) = state.presence.unregister(user_id, connection_id).await {
        state
            .service
            .broadcast_presence(user_id, false, Some(last_seen))
            .await;
    }
    debug!(%user_id, %connection_id, "websocket disconnected");
}

async fn handle_text(
    state: &AppState,
    user_id: Uuid,
    connection_id: Uuid,
    reply: &UnboundedSender<String>,
    text: &str,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(err) => {
            send_error(reply, &AppError::Validation(format!("malformed frame: {err}")));
            return;
        }
    };
    if let Err(err) = dispatch_frame(state, user_id, connection_id, reply, frame).await {
        send_error(reply, &err);
    }
}

async fn dispatch_frame(
    state: &AppState,
    user_id: Uuid,
    connection_id: Uuid,
    reply: &UnboundedSender<String>,
    frame: ClientFrame,
) -> AppResult<()> {
    match frame {
        ClientFrame::Join { conversation_id } => {
            state
                .service
                .join_conversation(connection_id, user_id, conversation_id)
                .await?;
            send_event(reply, user_id, &WsEvent::ConversationJoined { conversation_id });
        }
        ClientFrame::Leave { conversation_id } => {
            state
                .service
                .leave_conversation(connection_id, conversation_id)
                .await;
            send_event(reply, user_id, &WsEvent::ConversationLeft { conversation_id });
        }
        ClientFrame::Send {
            conversation_id,
            content,
            kind,
            media,
            reply_to,
            expires_in_seconds,
        } => {
            state
                .service
                .send_message(
                    user_id,
                    conversation_id,
                    SendMessageRequest {
                        content,
                        kind,
                        media,
                        reply_to,
                        expires_in_seconds,
                    },
                )
                .await?;
        }
        ClientFrame::TypingStart { conversation_id } => {
            state.service.typing(user_id, conversation_id, true).await?;
        }
        ClientFrame::TypingStop { conversation_id } => {
            state.service.typing(user_id, conversation_id, false).await?;
        }
        ClientFrame::MarkDelivered {
            conversation_id,
            message_ids,
        } => {
            state
                .service
                .mark_delivered(user_id, conversation_id, &message_ids)
                .await?;
        }
        ClientFrame::MarkRead {
            conversation_id,
            message_ids,
        } => {
            state
                .service
                .mark_read(user_id, conversation_id, &message_ids)
                .await?;
        }
        ClientFrame::React { message_id, emoji } => {
            state.service.add_reaction(user_id, message_id, emoji).await?;
        }
        ClientFrame::Unreact { message_id } => {
            state.service.remove_reaction(user_id, message_id).await?;
        }
        ClientFrame::Edit { message_id, content } => {
            state.service.edit_message(user_id, message_id, content).await?;
        }
        ClientFrame::Delete {
            message_id,
            for_everyone,
        } => {
            state
                .service
                .delete_message(user_id, message_id, for_everyone)
                .await?;
        }
        ClientFrame::Forward {
            message_id,
            target_conversation_ids,
        } => {
            let created = state
                .service
                .forward_message(user_id, message_id, &target_conversation_ids)
                .await?;
            send_frame(
                reply,
                &ServerFrame::Forwarded {
                    message_ids: created.iter().map(|m| m.id).collect(),
                },
            );
        }
        ClientFrame::Search {
            query,
            conversation_id,
        } => {
            let messages = state.service.search(user_id, &query, conversation_id).await?;
            send_frame(reply, &ServerFrame::SearchResults { query, messages });
        }
    }
    Ok(())
}

fn send_frame<T: serde::Serialize>(reply: &UnboundedSender<String>, frame: &T) {
    match serde_json::to_string(frame) {
        Ok(payload) => {
            let _ = reply.send(payload);
        }
        Err(err) => warn!(error = %err, "failed to serialize reply frame"),
    }
}

fn send_error(reply: &UnboundedSender<String>, err: &AppError) {
    send_frame(
        reply,
        &ServerFrame::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        },
    );
}

fn send_event(reply: &UnboundedSender<String>, actor: Uuid, event: &WsEvent) {
    match event.to_payload(actor) {
        Ok(payload) => {
            let _ = reply.send(payload);
        }
        Err(err) => warn!(error = %err, "failed to serialize event"),
    }
}
