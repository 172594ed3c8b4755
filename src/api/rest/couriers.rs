use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::rest::extract::{AuthUser, JsonBody};
use crate::error::AppError;
use crate::models::location::GeoPoint;
use crate::models::user::Role;
use crate::models::CourierId;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/kurir/track", post(update_location))
        .route("/kurir/track/:id", get(get_location))
        .route("/kurir/:id/location", get(get_location))
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    #[serde(alias = "kurir_id")]
    pub courier_id: CourierId,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize)]
pub struct Ack {
    pub message: &'static str,
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    JsonBody(payload): JsonBody<UpdateLocationRequest>,
) -> Result<Json<Ack>, AppError> {
    user.require_role(&[Role::Kurir])?;
    user.require_self(payload.courier_id)?;

    let entry = state
        .locations
        .update(payload.courier_id, payload.lat, payload.lng);
    state.metrics.location_updates_total.inc();

    debug!(
        courier_id = entry.courier_id,
        lat = entry.location.lat,
        lng = entry.location.lng,
        "courier location updated"
    );

    Ok(Json(Ack {
        message: "courier location updated",
    }))
}

async fn get_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GeoPoint>, AppError> {
    let courier_id = id
        .trim()
        .parse::<CourierId>()
        .map_err(|_| AppError::InvalidInput(format!("invalid courier id {id:?}")))?;

    state.locations.get(courier_id).map(Json)
}
