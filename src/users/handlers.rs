use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{require_admin, ActingUser, AuthUser},
    error::ApiError,
    notifications::notifier::{notify_best_effort, NotificationEvent},
    shipments::{services::ext_from_mime, UploadUrlRequest, UploadUrlResponse},
    state::AppState,
};

use super::dto::{
    MeResponse, PendingVerification, PrivacyRequest, PublicProfile, RegisterProfileRequest,
    ReviewVerificationRequest, SubmitVerificationRequest,
};
use super::repo::VerificationUpdate;
use super::repo_types::User;
use super::services::{document_upload_slot, validate_documents, validate_registration};

const DOCUMENT_URL_TTL_SECS: u64 = 10 * 60;

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/users/profile", post(register_profile))
        .route("/users/:id", get(public_profile))
        .route("/me", get(get_me))
        .route("/me/privacy", patch(update_privacy))
        .route("/me/verification", post(submit_verification))
        .route("/me/verification/upload-url", post(document_upload_url))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/verifications", get(list_pending))
        .route("/admin/users/:id/verification", post(review_verification))
}

#[instrument(skip(state, payload))]
pub async fn register_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(mut payload): Json<RegisterProfileRequest>,
) -> Result<(StatusCode, Json<MeResponse>), ApiError> {
    validate_registration(&mut payload).map_err(|msg| {
        warn!(%user_id, %msg, "invalid registration");
        ApiError::Validation(msg)
    })?;

    let user = User::create(&state.db, user_id, &payload)
        .await?
        .ok_or_else(|| ApiError::Conflict("profile or email already registered".into()))?;

    info!(%user_id, role = %user.role, "profile registered");
    Ok((StatusCode::CREATED, Json(MeResponse::new(user, 0))))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
) -> Result<Json<MeResponse>, ApiError> {
    let user = User::find(&state.db, actor.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
    let remaining = state.ledger.remaining_usage(actor.id).await?;
    Ok(Json(MeResponse::new(user, remaining)))
}

#[instrument(skip(state))]
pub async fn update_privacy(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(payload): Json<PrivacyRequest>,
) -> Result<Json<MeResponse>, ApiError> {
    let current = User::find(&state.db, actor.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
    let user = User::update_privacy(&state.db, actor.id, payload.apply_to(&current))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
    let remaining = state.ledger.remaining_usage(actor.id).await?;
    Ok(Json(MeResponse::new(user, remaining)))
}

#[instrument(skip(state))]
pub async fn public_profile(
    State(state): State<AppState>,
    ActingUser(_actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicProfile>, ApiError> {
    let user = User::find(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn submit_verification(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(payload): Json<SubmitVerificationRequest>,
) -> Result<Json<MeResponse>, ApiError> {
    validate_documents(actor.id, &payload).map_err(|msg| {
        warn!(user_id = %actor.id, %msg, "verification documents refused");
        ApiError::Validation(msg)
    })?;
    let user = match User::submit_verification(&state.db, actor.id, &payload).await? {
        VerificationUpdate::Done(user) => user,
        VerificationUpdate::Refused(e) => return Err(e.into()),
        VerificationUpdate::Missing => return Err(ApiError::NotFound("user not found".into())),
    };
    info!(user_id = %actor.id, "verification submitted");
    let remaining = state.ledger.remaining_usage(actor.id).await?;
    Ok(Json(MeResponse::new(user, remaining)))
}

#[instrument(skip(state))]
pub async fn document_upload_url(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(body): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    if ext_from_mime(&body.content_type).is_none() {
        return Err(ApiError::Validation(format!(
            "unsupported document type {}",
            body.content_type
        )));
    }
    let (key, upload_url) = document_upload_slot(&state, actor.id, &body.content_type).await?;
    Ok(Json(UploadUrlResponse { key, upload_url }))
}

#[instrument(skip(state))]
pub async fn list_pending(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
) -> Result<Json<Vec<PendingVerification>>, ApiError> {
    require_admin(actor)?;
    let users = User::list_pending_verifications(&state.db).await?;

    let mut out = Vec::with_capacity(users.len());
    for u in users {
        out.push(PendingVerification {
            id: u.id,
            name: u.name(),
            role: u.role,
            id_type: u.id_type.clone(),
            id_front_url: presign_opt(&state, u.id_front_key.as_deref()).await?,
            id_back_url: presign_opt(&state, u.id_back_key.as_deref()).await?,
            selfie_url: presign_opt(&state, u.selfie_key.as_deref()).await?,
        });
    }
    Ok(Json(out))
}

#[instrument(skip(state))]
pub async fn review_verification(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewVerificationRequest>,
) -> Result<Json<PublicProfile>, ApiError> {
    require_admin(actor)?;
    let user = match User::review_verification(&state.db, id, payload.approve).await? {
        VerificationUpdate::Done(user) => user,
        VerificationUpdate::Refused(e) => return Err(e.into()),
        VerificationUpdate::Missing => return Err(ApiError::NotFound("user not found".into())),
    };

    info!(user_id = %id, approve = payload.approve, admin_id = %actor.id, "verification reviewed");
    notify_best_effort(
        state.notifier.as_ref(),
        id,
        NotificationEvent::VerificationDecided,
        json!({ "approved": payload.approve }),
    )
    .await;
    Ok(Json(user.into()))
}

async fn presign_opt(state: &AppState, key: Option<&str>) -> Result<Option<String>, ApiError> {
    match key {
        Some(k) => Ok(Some(state.storage.presign_get(k, DOCUMENT_URL_TTL_SECS).await?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::app::build_app;
    use crate::state::AppState;
    use crate::testing::{bearer, MemoryStore, RecordingNotifier};
    use crate::users::repo_types::UserRole;

    #[tokio::test]
    async fn admin_role_cannot_be_registered() {
        let app = build_app(AppState::fake());
        let req = Request::post("/api/v1/users/profile")
            .header("authorization", bearer(uuid::Uuid::new_v4()))
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "first_name": "Eve",
                    "last_name": "Admin",
                    "email": "eve@example.com",
                    "role": "ADMIN"
                })
                .to_string(),
            ))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "validation_failed");
    }

    async fn send(app: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post(uri: &str, user: uuid::Uuid, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("authorization", bearer(user))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn document_slots_belong_to_the_uploader() {
        let store = MemoryStore::default();
        let sender = store.add_user(UserRole::Sender).await;
        let app = build_app(AppState::fake_with(store, RecordingNotifier::default()));

        let (status, body) = send(
            app.clone(),
            post("/api/v1/me/verification/upload-url", sender, json!({ "content_type": "image/png" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let key = body["key"].as_str().unwrap();
        assert!(key.starts_with(&format!("verification/{sender}/")));
        assert!(key.ends_with(".png"));

        let (status, _) = send(
            app,
            post("/api/v1/me/verification/upload-url", sender, json!({ "content_type": "text/plain" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn foreign_documents_are_not_submitted() {
        let store = MemoryStore::default();
        let attacker = store.add_user(UserRole::Picker).await;
        let victim = store.add_user(UserRole::Picker).await;
        let app = build_app(AppState::fake_with(store, RecordingNotifier::default()));

        let (status, body) = send(
            app,
            post(
                "/api/v1/me/verification",
                attacker,
                json!({
                    "id_type": "passport",
                    "id_front_key": format!("verification/{victim}/front.jpg"),
                    "selfie_key": format!("shipments/{victim}/x.jpg"),
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_failed");
    }

    #[tokio::test]
    async fn admin_routes_refuse_other_roles() {
        let store = MemoryStore::default();
        let picker = store.add_user(UserRole::Picker).await;
        let app = build_app(AppState::fake_with(store, RecordingNotifier::default()));

        let req = Request::post(format!("/api/v1/admin/users/{}/verification", uuid::Uuid::new_v4()))
            .header("authorization", bearer(picker))
            .header("content-type", "application/json")
            .body(Body::from(json!({ "approve": true }).to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }
}
