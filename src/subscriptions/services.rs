//! Checkout and settlement rules for subscription transactions.

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::subscriptions::ledger::has_other_active_plan;
use crate::subscriptions::repo_types::{
    PaymentMethod, SubscriptionPlan, SubscriptionTransaction, TransactionStatus,
};
use crate::users::repo_types::UserRole;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{plan} plans cannot be bought by {user} accounts")]
    RoleMismatch { plan: UserRole, user: UserRole },
    #[error("another plan is still active")]
    PlanSwitchBlocked,
    #[error("insufficient wallet balance")]
    InsufficientBalance { balance: f64, required: f64 },
    #[error("transaction is already {0:?}")]
    AlreadySettled(TransactionStatus),
    #[error("a transaction can only be settled as COMPLETED or REJECTED")]
    InvalidSettlement,
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error("plan has transactions and cannot be deleted")]
    PlanInUse,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// How a checkout is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    /// Paid from the wallet, activated immediately.
    Instant,
    /// Waits for an admin to confirm the external payment.
    AwaitingPayment,
}

/// Usage allowance granted by activating `plan` at `now`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activation {
    pub remaining_usage: i32,
    pub end_date: OffsetDateTime,
}

pub fn activation(plan: &SubscriptionPlan, now: OffsetDateTime) -> Activation {
    Activation {
        remaining_usage: plan.usage_limit,
        end_date: now + Duration::days(i64::from(plan.duration_days.max(1))),
    }
}

/// `GP-SUB-` followed by eight uppercase hex digits.
pub fn generate_reference() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("GP-SUB-{}", hex[..8].to_uppercase())
}

pub fn check_checkout(
    user_role: UserRole,
    wallet_balance: f64,
    plan: &SubscriptionPlan,
    method: PaymentMethod,
    existing: &[SubscriptionTransaction],
    now: OffsetDateTime,
) -> Result<CheckoutKind, SubscriptionError> {
    if plan.role != user_role {
        return Err(SubscriptionError::RoleMismatch {
            plan: plan.role,
            user: user_role,
        });
    }
    if has_other_active_plan(existing, plan.id, now) {
        return Err(SubscriptionError::PlanSwitchBlocked);
    }
    match method {
        PaymentMethod::Wallet if wallet_balance < plan.price => {
            Err(SubscriptionError::InsufficientBalance {
                balance: wallet_balance,
                required: plan.price,
            })
        }
        PaymentMethod::Wallet => Ok(CheckoutKind::Instant),
        PaymentMethod::Direct | PaymentMethod::Chapa | PaymentMethod::Telebirr => {
            Ok(CheckoutKind::AwaitingPayment)
        }
    }
}

/// Only pending transactions can be settled, and only to a final status.
pub fn check_settlement(
    current: TransactionStatus,
    target: TransactionStatus,
) -> Result<(), SubscriptionError> {
    if current != TransactionStatus::Pending {
        return Err(SubscriptionError::AlreadySettled(current));
    }
    if target == TransactionStatus::Pending {
        return Err(SubscriptionError::InvalidSettlement);
    }
    Ok(())
}

pub fn validate_plan(
    name: &str,
    price: f64,
    usage_limit: i32,
    role: UserRole,
    duration_days: i32,
) -> Result<(), SubscriptionError> {
    let invalid = |m: &str| Err(SubscriptionError::InvalidPlan(m.into()));
    if name.trim().is_empty() {
        return invalid("name is required");
    }
    if !(price.is_finite() && price >= 0.0) {
        return invalid("price must not be negative");
    }
    if usage_limit < 0 {
        return invalid("usage_limit must not be negative");
    }
    if duration_days <= 0 {
        return invalid("duration_days must be positive");
    }
    if role == UserRole::Admin {
        return invalid("plans are for SENDER or PICKER accounts");
    }
    Ok(())
}
