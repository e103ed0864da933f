use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{auth::ActingUser, error::ApiError, state::AppState};

use super::dto::{
    AdvanceRequest, CreateShipmentRequest, MarketplaceQuery, Pagination, ShipmentView,
    UploadUrlRequest, UploadUrlResponse,
};
use super::services::{ext_from_mime, image_upload_slot, presign_images};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/shipments", get(list_marketplace))
        .route("/shipments/mine", get(list_mine))
        .route("/shipments/:id", get(get_shipment))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/shipments", post(create_shipment))
        .route("/shipments/images/upload-url", post(upload_url))
        .route("/shipments/:id/claim", post(claim))
        .route("/shipments/:id/approve", post(approve))
        .route("/shipments/:id/reject", post(reject))
        .route("/shipments/:id/confirm-ready", post(confirm_ready))
        .route("/shipments/:id/status", post(advance))
        .route("/shipments/:id/confirm-receipt", post(confirm_receipt))
}

// --- handlers ---

#[instrument(skip(state, body))]
pub async fn create_shipment(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(body): Json<CreateShipmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let shipment = state.lifecycle.post(actor, body.into_new(actor.id)).await?;
    let location = format!("/api/v1/shipments/{}", shipment.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(ShipmentView::from(shipment)),
    ))
}

#[instrument(skip(state))]
pub async fn list_marketplace(
    State(state): State<AppState>,
    ActingUser(_actor): ActingUser,
    Query(q): Query<MarketplaceQuery>,
) -> Result<Json<Vec<ShipmentView>>, ApiError> {
    let page = Pagination { limit: q.limit, offset: q.offset };
    let (limit, offset) = page.clamped();
    let rows = super::repo::list_marketplace(
        &state.db,
        q.pickup_country.as_deref(),
        q.dest_country.as_deref(),
        limit,
        offset,
    )
    .await?;
    Ok(Json(rows.into_iter().map(ShipmentView::from).collect()))
}

#[instrument(skip(state))]
pub async fn list_mine(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<ShipmentView>>, ApiError> {
    let (limit, offset) = p.clamped();
    let rows = super::repo::list_for_user(&state.db, actor.id, actor.role, limit, offset).await?;
    Ok(Json(rows.into_iter().map(ShipmentView::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_shipment(
    State(state): State<AppState>,
    ActingUser(_actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentView>, ApiError> {
    let shipment = state.lifecycle.get(id).await?;
    let urls = presign_images(&state, &shipment.images).await?;
    let mut view = ShipmentView::from(shipment);
    view.image_urls = Some(urls);
    Ok(Json(view))
}

#[instrument(skip(state))]
pub async fn upload_url(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(body): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    if ext_from_mime(&body.content_type).is_none() {
        return Err(ApiError::Validation(format!(
            "unsupported image type {}",
            body.content_type
        )));
    }
    let (key, upload_url) = image_upload_slot(&state, actor.id, &body.content_type).await?;
    Ok(Json(UploadUrlResponse { key, upload_url }))
}

#[instrument(skip(state))]
pub async fn claim(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentView>, ApiError> {
    Ok(Json(state.lifecycle.claim(actor, id).await?.into()))
}

#[instrument(skip(state))]
pub async fn approve(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentView>, ApiError> {
    Ok(Json(state.lifecycle.approve(actor, id).await?.into()))
}

#[instrument(skip(state))]
pub async fn reject(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentView>, ApiError> {
    Ok(Json(state.lifecycle.reject(actor, id).await?.into()))
}

#[instrument(skip(state))]
pub async fn confirm_ready(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentView>, ApiError> {
    Ok(Json(state.lifecycle.confirm_ready(actor, id).await?.into()))
}

#[instrument(skip(state))]
pub async fn advance(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AdvanceRequest>,
) -> Result<Json<ShipmentView>, ApiError> {
    Ok(Json(state.lifecycle.advance(actor, id, body.status).await?.into()))
}

#[instrument(skip(state))]
pub async fn confirm_receipt(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentView>, ApiError> {
    Ok(Json(state.lifecycle.confirm_receipt(actor, id).await?.into()))
}
