use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::rest::extract::AuthUser;
use crate::error::AppError;
use crate::models::user::Role;
use crate::models::OrderId;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/orders/:id/chat/schedule-delete",
            post(schedule_delete).delete(cancel_delete),
        )
        .route("/orders/:id/messages", delete(purge_messages))
}

#[derive(Serialize)]
struct ScheduleResponse {
    order_id: OrderId,
    scheduled: bool,
    due_at: DateTime<Utc>,
}

async fn schedule_delete(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, AppError> {
    let purge = state.retention.schedule(&id).await?;
    Ok(Json(ScheduleResponse {
        order_id: purge.order_id,
        scheduled: true,
        due_at: purge.due_at,
    }))
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled: bool,
}

async fn cancel_delete(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = state.retention.cancel(&id).await?;
    if !cancelled {
        return Err(AppError::NotFound(format!("no chat purge pending for order {id}")));
    }
    Ok(Json(CancelResponse { cancelled }))
}

#[derive(Serialize)]
struct PurgeResponse {
    deleted: u64,
}

async fn purge_messages(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<PurgeResponse>, AppError> {
    user.require_role(&[Role::Admin])?;
    let deleted = state.relay.purge_now(&id).await?;
    Ok(Json(PurgeResponse { deleted }))
}
