use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::ActingUser,
    error::ApiError,
    notifications::notifier::{notify_best_effort, NotificationEvent},
    shipments::Pagination,
    state::AppState,
};

use super::dto::{OpenThreadRequest, SendMessageRequest, ThreadRead};
use super::repo;
use super::repo_types::{Message, MessageThread, ThreadSummary};
use super::services::{may_anchor, validate_participants, validate_text};

pub fn thread_routes() -> Router<AppState> {
    Router::new()
        .route("/messages/threads", get(list_threads).post(open_thread))
        .route(
            "/messages/threads/:id/messages",
            get(list_messages).post(send_message),
        )
        .route("/messages/threads/:id/read", post(mark_read))
}

#[instrument(skip(state))]
pub async fn open_thread(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Json(body): Json<OpenThreadRequest>,
) -> Result<(StatusCode, Json<MessageThread>), ApiError> {
    validate_participants(actor.id, body.participant_id).map_err(ApiError::Validation)?;
    if state.identity.actor(body.participant_id).await?.is_none() {
        return Err(ApiError::NotFound("participant not found".into()));
    }
    if let Some(shipment_id) = body.shipment_id {
        let sender = repo::shipment_sender(&state.db, shipment_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("shipment not found".into()))?;
        if !may_anchor(sender, actor.id, body.participant_id) {
            return Err(ApiError::Forbidden(
                "shipment threads must include the shipment's sender".into(),
            ));
        }
    }

    let (thread, created) =
        repo::open_thread(&state.db, actor.id, body.participant_id, body.shipment_id).await?;
    if created {
        info!(thread_id = %thread.id, user_id = %actor.id, "message thread opened");
        return Ok((StatusCode::CREATED, Json(thread)));
    }
    Ok((StatusCode::OK, Json(thread)))
}

#[instrument(skip(state))]
pub async fn list_threads(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
) -> Result<Json<Vec<ThreadSummary>>, ApiError> {
    Ok(Json(repo::list_threads(&state.db, actor.id).await?))
}

#[instrument(skip(state))]
pub async fn list_messages(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<Message>>, ApiError> {
    participant_thread(&state, id, actor.id).await?;
    let (limit, offset) = p.clamped();
    Ok(Json(repo::list_messages(&state.db, id, limit, offset).await?))
}

#[instrument(skip(state, body))]
pub async fn send_message(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let text = validate_text(&body.text).map_err(ApiError::Validation)?;
    let (thread, receiver) = participant_thread(&state, id, actor.id).await?;

    let message = repo::insert_message(&state.db, &thread, actor.id, receiver, &text).await?;
    notify_best_effort(
        state.notifier.as_ref(),
        receiver,
        NotificationEvent::MessageReceived,
        json!({ "thread_id": thread.id, "shipment_id": thread.shipment_id }),
    )
    .await;
    Ok((StatusCode::CREATED, Json(message)))
}

#[instrument(skip(state))]
pub async fn mark_read(
    State(state): State<AppState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ThreadRead>, ApiError> {
    participant_thread(&state, id, actor.id).await?;
    let updated = repo::mark_thread_read(&state.db, id, actor.id).await?;
    Ok(Json(ThreadRead { updated }))
}

/// The thread and the other participant. Threads the user is not part of
/// are reported as missing.
async fn participant_thread(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> Result<(MessageThread, Uuid), ApiError> {
    let thread = repo::find_thread(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("thread not found".into()))?;
    let other = thread
        .counterpart(user_id)
        .ok_or_else(|| ApiError::NotFound("thread not found".into()))?;
    Ok((thread, other))
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
    async fn threads_need_another_registered_user() {
        let store = MemoryStore::default();
        let sender = store.add_user(UserRole::Sender).await;
        let app = build_app(AppState::fake_with(store, RecordingNotifier::default()));

        let (status, body) = send(
            app.clone(),
            post("/api/v1/messages/threads", sender, json!({ "participant_id": sender })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "validation_failed");

        let (status, body) = send(
            app,
            post(
                "/api/v1/messages/threads",
                sender,
                json!({ "participant_id": uuid::Uuid::new_v4() }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn blank_messages_are_refused() {
        let store = MemoryStore::default();
        let picker = store.add_user(UserRole::Picker).await;
        let app = build_app(AppState::fake_with(store, RecordingNotifier::default()));

        let uri = format!("/api/v1/messages/threads/{}/messages", uuid::Uuid::new_v4());
        let (status, _) = send(app, post(&uri, picker, json!({ "text": "   " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
