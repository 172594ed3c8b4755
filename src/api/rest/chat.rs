use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::rest::extract::{AuthUser, JsonBody};
use crate::chat::relay::SendReceipt;
use crate::error::AppError;
use crate::models::message::{ChatMessageWithSender, SendChatRequest};
use crate::models::user::Role;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat/send", post(send_message))
        .route("/chat/:order_id/messages", get(load_history))
        .route("/chat/:order_id/read", put(mark_read))
        .route("/centrifugo/token", get(issue_token))
}

#[derive(Serialize)]
struct SendResponse {
    status: &'static str,
    #[serde(flatten)]
    receipt: SendReceipt,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonBody(mut payload): JsonBody<SendChatRequest>,
) -> Result<Json<SendResponse>, AppError> {
    user.require_role(&[Role::Customer, Role::Kurir])?;
    // Attribution is checked only when the sender id is well formed;
    // malformed ids are reported by validation instead.
    if let Ok(sender_id) = payload.sender_id.trim().parse() {
        user.require_self(sender_id)?;
    }
    payload.sender_role = user.attributed_role(&payload.sender_role)?;

    let receipt = state.relay.send(payload).await?;
    Ok(Json(SendResponse {
        status: "message sent",
        receipt,
    }))
}

#[derive(Serialize)]
struct HistoryResponse {
    messages: Vec<ChatMessageWithSender>,
}

async fn load_history(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let messages = state.relay.load_history(&order_id).await?;
    Ok(Json(HistoryResponse { messages }))
}

#[derive(Serialize)]
struct MarkReadResponse {
    updated: u64,
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let updated = state.relay.mark_read(&order_id, user.0.user_id).await?;
    Ok(Json(MarkReadResponse { updated }))
}

#[derive(Deserialize)]
struct TokenQuery {
    user_id: Option<String>,
}

#[derive(Serialize)]
struct TokenResponse {
    token: String,
    user_id: String,
    expires_at: DateTime<Utc>,
}

async fn issue_token(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenResponse>, AppError> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("user_id required".to_string()))?;

    let numeric_id = user_id
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput("user_id must be numeric".to_string()))?;
    user.require_self(numeric_id)?;

    let issued = state.relay.issue_token(user_id.trim())?;
    let expires_at = DateTime::from_timestamp(issued.claims.exp, 0)
        .ok_or_else(|| AppError::Internal("token expiry out of range".to_string()))?;

    Ok(Json(TokenResponse {
        token: issued.token,
        user_id: issued.claims.sub,
        expires_at,
    }))
}
