use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{require_admin, ActingUser, AuthUser},
    error::ApiError,
    shipments::Pagination,
    state::AppState,
};

use super::repo::{self, Notification};
use super::services::{validate_broadcast, BroadcastRequest};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct Broadcasted {
    pub delivered: u64,
}

pub fn notification_routes() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/:id/read", post(mark_read))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/admin/notifications/broadcast", post(broadcast))
}

#[instrument(skip(state))]
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let page = Pagination {
        limit: q.limit.unwrap_or(20),
        offset: q.offset,
    };
    let (limit, offset) = page.clamped();
    let rows = repo::list_for_user(&state.db, user_id, q.unread_only, limit, offset).await?;
    Ok(Json(rows))
}

#[instrument(skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MarkedRead>, ApiError> {
    if !repo::mark_read(&state.db, user_id, id).await? {
        return Err(ApiError::NotFound("notification not found".into()));
    }
    Ok(Json(MarkedRead { updated: 1 }))
}

#[instrument(skip(state))]
pub async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MarkedRead>, ApiError> {
    let updated = repo::mark_all_read(&state.db, user_id).await?;
    Ok(Json(MarkedRead { updated }))
}

#[instrument(skip(state, body))]
pub async fn broadcast(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<Broadcasted>, ApiError> {
    require_admin(actor)?;
    let rendered = validate_broadcast(&body).map_err(|msg| {
        warn!(admin_id = %actor.id, %msg, "broadcast refused");
        ApiError::Validation(msg)
    })?;
    let delivered = repo::broadcast(&state.db, &rendered, &body.target).await?;
    info!(admin_id = %actor.id, delivered, target = ?body.target, "notification broadcast");
    Ok(Json(Broadcasted { delivered }))
}
