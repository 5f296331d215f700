use axum::Json;
use axum::extract::{Path, State};
use core_types::{ChatId, ChatRole, MessageFeedback, MessageId, UserId};
use serde::Deserialize;
use serde_json::{Value, json};
use storage_sqlite::{Chat, ChatMessage, SqliteStorage};

use crate::error::{ApiError, ApiResult};
use crate::session::RequireSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    role: ChatRole,
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    feedback: Option<MessageFeedback>,
}

/// POST /api/chats
pub async fn create_chat(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
    Json(req): Json<CreateChatRequest>,
) -> ApiResult<Json<Chat>> {
    let storage = state.require_storage()?;
    let title = match req.title.trim() {
        "" => "New chat",
        title => title,
    };
    Ok(Json(storage.create_chat(session.user.id, title).await?))
}

/// GET /api/chats
pub async fn list_chats(
    State(state): State<AppState>,
    RequireSession(session): RequireSession,
) -> ApiResult<Json<Vec<Chat>>> {
    let storage = state.require_storage()?;
    Ok(Json(storage.list_chats(session.user.id).await?))
}

/// POST /api/chats/{id}/messages
pub async fn append_message(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    RequireSession(session): RequireSession,
    Json(req): Json<AppendMessageRequest>,
) -> ApiResult<Json<ChatMessage>> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".into()));
    }
    let storage = state.require_storage()?;
    owned_chat(&storage, chat_id, &session.user.id).await?;
    let message = storage
        .append_message(chat_id, req.role, req.content)
        .await?;
    Ok(Json(message))
}

/// GET /api/chats/{id}/messages
pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<ChatId>,
    RequireSession(session): RequireSession,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let storage = state.require_storage()?;
    owned_chat(&storage, chat_id, &session.user.id).await?;
    Ok(Json(storage.list_messages(chat_id).await?))
}

/// POST /api/messages/{id}/feedback
pub async fn set_feedback(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    RequireSession(session): RequireSession,
    Json(req): Json<FeedbackRequest>,
) -> ApiResult<Json<Value>> {
    let storage = state.require_storage()?;
    if storage.message_owner(message_id).await? != Some(session.user.id) {
        return Err(ApiError::NotFound("message"));
    }
    storage.set_message_feedback(message_id, req.feedback).await?;
    Ok(Json(json!({ "ok": true, "feedback": req.feedback })))
}

/// Other users' chats are reported as missing rather than forbidden.
async fn owned_chat(storage: &SqliteStorage, chat_id: ChatId, user_id: &UserId) -> ApiResult<Chat> {
    match storage.get_chat(chat_id).await? {
        Some(chat) if chat.user_id == *user_id => Ok(chat),
        _ => Err(ApiError::NotFound("chat")),
    }
}
