use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::errors::AppError;
use crate::models::ChatRequest;
use crate::service::chat_service::ChatService;

/// Tenancy is carried by an optional `x-user-id` header; absent means
/// single-tenant / unauthenticated access.
fn user_id(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-user-id").and_then(|v| v.to_str().ok())
}

/// POST `/api/chat` — run one chat turn, returning the assistant message.
pub async fn chat_handler(
    State(svc): State<ChatService>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    match svc.chat(request, user_id(&headers)).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST `/api/chats` — create an empty chat.
pub async fn create_chat_handler(
    State(svc): State<ChatService>,
    headers: HeaderMap,
) -> Response {
    match svc.create_chat(user_id(&headers)).await {
        Ok(id) => Json(json!({ "id": id })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/chats` — list chat metadata, newest first.
pub async fn list_chats_handler(
    State(svc): State<ChatService>,
    headers: HeaderMap,
) -> Response {
    match svc.get_chats(user_id(&headers)).await {
        Ok(chats) => Json(chats).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/chats/{id}/messages` — full transcript for a chat.
pub async fn list_messages_handler(
    Path(id): Path<String>,
    State(svc): State<ChatService>,
    headers: HeaderMap,
) -> Response {
    match svc.get_messages(&id, user_id(&headers)).await {
        Ok(messages) => Json(messages).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET `/api/chats/{id}/title` — derived title for a chat.
pub async fn chat_title_handler(
    Path(id): Path<String>,
    State(svc): State<ChatService>,
    headers: HeaderMap,
) -> Response {
    match svc.get_title(&id, user_id(&headers)).await {
        Ok(title) => Json(json!({ "title": title })).into_response(),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &AppError) -> Response {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_unauthorized() {
        StatusCode::FORBIDDEN
    } else if err.is_agent_unavailable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}
