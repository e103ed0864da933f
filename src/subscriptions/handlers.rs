use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::{require_admin, ActingUser},
    error::ApiError,
    notifications::notifier::{notify_best_effort, NotificationEvent},
    state::AppState,
};

use super::dto::{
    CheckoutRequest, CreatePlanRequest, MySubscriptions, PlanQuery, SettleRequest,
    TransactionQuery, UpdatePlanRequest,
};
use super::ledger::{active_subscription, remaining_usage};
use super::repo_types::{SubscriptionPlan, SubscriptionTransaction};
use super::services::{generate_reference, validate_plan, SubscriptionError};

pub fn plan_routes() -> Router<AppState> {
    Router::new().route("/subscriptions/plans", get(list_plans))
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/subscriptions/checkout", post(checkout))
        .route("/subscriptions/mine", get(my_subscriptions))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/subscriptions/plans", post(create_plan))
        .route(
            "/admin/subscriptions/plans/:id",
            put(update_plan).delete(delete_plan),
        )
        .route("/admin/subscriptions/transactions", get(list_transactions))
        .route("/admin/subscriptions/transactions/:id/settle", post(settle))
}

#[instrument(skip(state))]
pub async fn list_plans(
    State(state): State<AppState>,
    Query(q): Query<PlanQuery>,
) -> Result<Json<Vec<SubscriptionPlan>>, ApiError> {
    Ok(Json(super::repo::list_plans(&state.db, q.role).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_plan(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(payload): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<SubscriptionPlan>), ApiError> {
    require_admin(actor)?;
    validate_plan(
        &payload.name,
        payload.price,
        payload.usage_limit,
        payload.role,
        payload.duration_days,
    )?;
    let plan = super::repo::create_plan(
        &state.db,
        payload.name.trim(),
        payload.price,
        payload.usage_limit,
        payload.role,
        payload.duration_days,
        payload.description.as_deref(),
    )
    .await?;
    info!(plan_id = %plan.id, name = %plan.name, "plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

#[instrument(skip(state, payload))]
pub async fn update_plan(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdatePlanRequest>,
) -> Result<Json<SubscriptionPlan>, ApiError> {
    require_admin(actor)?;
    let current = super::repo::find_plan(&state.db, id)
        .await?
        .ok_or(SubscriptionError::NotFound("plan"))?;
    let next = payload.apply_to(&current)?;
    let plan = super::repo::update_plan(&state.db, &next)
        .await?
        .ok_or(SubscriptionError::NotFound("plan"))?;
    info!(plan_id = %plan.id, "plan updated");
    Ok(Json(plan))
}

#[instrument(skip(state))]
pub async fn delete_plan(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    require_admin(actor)?;
    super::repo::delete_plan(&state.db, id).await?;
    info!(plan_id = %id, "plan deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn checkout(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<SubscriptionTransaction>), ApiError> {
    let reference = payload
        .transaction_reference
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(generate_reference);

    let record = super::repo::checkout(
        &state.db,
        actor.id,
        payload.plan_id,
        payload.payment_method,
        reference,
    )
    .await
    .map_err(reference_conflict)?;

    info!(
        user_id = %actor.id,
        transaction_id = %record.id,
        status = ?record.status,
        "subscription checkout"
    );
    if record.is_active {
        notify_activated(&state, &record).await;
        return Ok((StatusCode::CREATED, Json(record)));
    }
    Ok((StatusCode::ACCEPTED, Json(record)))
}

#[instrument(skip(state))]
pub async fn my_subscriptions(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
) -> Result<Json<MySubscriptions>, ApiError> {
    let history = super::repo::list_for_user(&state.db, actor.id).await?;
    let now = OffsetDateTime::now_utc();
    Ok(Json(MySubscriptions {
        active: active_subscription(&history, now).cloned(),
        remaining_usage: remaining_usage(&history, now),
        history,
    }))
}

#[instrument(skip(state))]
pub async fn list_transactions(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Query(q): Query<TransactionQuery>,
) -> Result<Json<Vec<SubscriptionTransaction>>, ApiError> {
    require_admin(actor)?;
    Ok(Json(super::repo::list_by_status(&state.db, q.status).await?))
}

#[instrument(skip(state))]
pub async fn settle(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SettleRequest>,
) -> Result<Json<SubscriptionTransaction>, ApiError> {
    require_admin(actor)?;
    let (record, activated) = super::repo::settle(&state.db, id, payload.status).await?;

    info!(transaction_id = %id, status = ?record.status, admin_id = %actor.id, "transaction settled");
    if activated.is_some() {
        notify_activated(&state, &record).await;
    }
    Ok(Json(record))
}

async fn notify_activated(state: &AppState, record: &SubscriptionTransaction) {
    notify_best_effort(
        state.notifier.as_ref(),
        record.user_id,
        NotificationEvent::SubscriptionActivated,
        json!({ "plan_name": record.plan_name, "transaction_id": record.id }),
    )
    .await;
}

fn reference_conflict(e: SubscriptionError) -> ApiError {
    match &e {
        SubscriptionError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            ApiError::Conflict("transaction reference already used".into())
        }
        _ => e.into(),
    }
}
