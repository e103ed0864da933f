use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::error;

use crate::persistence::StoreError;
use crate::shipments::lifecycle::LifecycleError;
use crate::shipments::status::TransitionError;
use crate::subscriptions::ledger::QuotaError;
use crate::subscriptions::services::SubscriptionError;
use crate::users::services::VerificationError;

/// Error returned by every handler, rendered as
/// `{"error": {"code", "message", "details"}}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    Terminal(String),
    #[error("quota exceeded")]
    QuotaExceeded { remaining: i32 },
    #[error("verification is under review")]
    VerificationPending,
    #[error("shipment already taken")]
    AlreadyTaken,
    #[error("{0}")]
    Conflict(String),
    #[error("insufficient wallet balance")]
    InsufficientBalance { balance: f64, required: f64 },
    #[error("another plan is still active")]
    PlanSwitchBlocked,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) | ApiError::VerificationPending => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::QuotaExceeded { .. } | ApiError::InsufficientBalance { .. } => {
                StatusCode::PAYMENT_REQUIRED
            }
            ApiError::InvalidTransition(_)
            | ApiError::Terminal(_)
            | ApiError::AlreadyTaken
            | ApiError::Conflict(_)
            | ApiError::PlanSwitchBlocked => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation(_) => "validation_failed",
            ApiError::InvalidTransition(_) => "invalid_transition",
            ApiError::Terminal(_) => "terminal",
            ApiError::QuotaExceeded { .. } => "quota_exceeded",
            ApiError::VerificationPending => "verification_pending",
            ApiError::AlreadyTaken => "already_taken",
            ApiError::Conflict(_) => "conflict",
            ApiError::InsufficientBalance { .. } => "insufficient_balance",
            ApiError::PlanSwitchBlocked => "plan_switch_blocked",
            ApiError::Internal(_) => "internal",
        }
    }

    fn details(&self) -> Value {
        match self {
            ApiError::QuotaExceeded { remaining } => json!({ "remaining": remaining }),
            ApiError::InsufficientBalance { balance, required } => {
                json!({ "balance": balance, "required": required })
            }
            _ => json!({}),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(e) => {
                error!(error = ?e, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = json!({
            "error": {
                "code": self.code(),
                "message": message,
                "details": self.details(),
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Terminal(_) => ApiError::Terminal(e.to_string()),
            TransitionError::Invalid { .. } | TransitionError::Regression { .. } => {
                ApiError::InvalidTransition(e.to_string())
            }
            TransitionError::RoleNotAllowed { .. } | TransitionError::NotParticipant(_) => {
                ApiError::Forbidden(e.to_string())
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::MissingUser(_) => ApiError::NotFound(e.to_string()),
            other => ApiError::Internal(other.into()),
        }
    }
}

impl From<QuotaError> for ApiError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::Exceeded { remaining, .. } => ApiError::QuotaExceeded { remaining },
            QuotaError::Store(e) => e.into(),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotFound(_) => ApiError::NotFound(e.to_string()),
            LifecycleError::Transition(t) => t.into(),
            LifecycleError::QuotaExceeded { remaining } => ApiError::QuotaExceeded { remaining },
            LifecycleError::VerificationPending => ApiError::VerificationPending,
            LifecycleError::AlreadyTaken => ApiError::AlreadyTaken,
            LifecycleError::Conflict => ApiError::Conflict(e.to_string()),
            LifecycleError::PostingNotAllowed(_) => ApiError::Forbidden(e.to_string()),
            LifecycleError::Validation(msg) => ApiError::Validation(msg),
            LifecycleError::Store(s) => s.into(),
        }
    }
}

impl From<SubscriptionError> for ApiError {
    fn from(e: SubscriptionError) -> Self {
        match e {
            SubscriptionError::NotFound(_) => ApiError::NotFound(e.to_string()),
            SubscriptionError::RoleMismatch { .. } => ApiError::Forbidden(e.to_string()),
            SubscriptionError::PlanSwitchBlocked => ApiError::PlanSwitchBlocked,
            SubscriptionError::InsufficientBalance { balance, required } => {
                ApiError::InsufficientBalance { balance, required }
            }
            SubscriptionError::AlreadySettled(_) | SubscriptionError::PlanInUse => {
                ApiError::Conflict(e.to_string())
            }
            SubscriptionError::InvalidSettlement | SubscriptionError::InvalidPlan(_) => {
                ApiError::Validation(e.to_string())
            }
            SubscriptionError::Database(db) => db.into(),
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(e: VerificationError) -> Self {
        ApiError::Conflict(e.to_string())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Internal(e.into())
    }
}
