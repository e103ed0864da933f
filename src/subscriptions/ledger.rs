//! Quota ledger: per-user allowance of posts (senders) or claims (pickers)
//! granted by the active subscription transaction.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::persistence::{LifecycleStore, LifecycleTx, StoreError};
use crate::subscriptions::repo_types::SubscriptionTransaction;

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("quota exceeded: {remaining} remaining, {requested} requested")]
    Exceeded { remaining: i32, requested: i32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SubscriptionTransaction {
    /// Flagged active, not expired. Remaining usage is not considered.
    pub fn is_current_at(&self, now: OffsetDateTime) -> bool {
        self.is_active && self.end_date.map_or(true, |end| end > now)
    }

    /// Grants usage right now.
    pub fn is_active_at(&self, now: OffsetDateTime) -> bool {
        self.is_current_at(now) && self.remaining_usage > 0
    }
}

pub fn active_subscription(
    subs: &[SubscriptionTransaction],
    now: OffsetDateTime,
) -> Option<&SubscriptionTransaction> {
    subs.iter()
        .filter(|s| s.is_active_at(now))
        .max_by_key(|s| s.created_at)
}

pub fn remaining_usage(subs: &[SubscriptionTransaction], now: OffsetDateTime) -> i32 {
    active_subscription(subs, now).map_or(0, |s| s.remaining_usage)
}

pub fn has_other_active_plan(
    subs: &[SubscriptionTransaction],
    plan_id: Uuid,
    now: OffsetDateTime,
) -> bool {
    subs.iter()
        .any(|s| s.plan_id != plan_id && s.is_current_at(now))
}

/// Check-and-decrement inside an open transaction. The charge disappears with
/// the transaction if it is not committed. Locks the user row before the
/// subscription row.
pub async fn consume_in(
    tx: &mut dyn LifecycleTx,
    user_id: Uuid,
    amount: i32,
    now: OffsetDateTime,
) -> Result<i32, QuotaError> {
    tx.lock_user(user_id).await?;
    let Some(sub) = tx.get_active_subscription(user_id, now).await? else {
        return Err(QuotaError::Exceeded {
            remaining: 0,
            requested: amount,
        });
    };
    if sub.remaining_usage < amount || !tx.decrement_quota(sub.id, amount).await? {
        return Err(QuotaError::Exceeded {
            remaining: sub.remaining_usage,
            requested: amount,
        });
    }
    debug!(%user_id, subscription_id = %sub.id, amount, "quota consumed");
    Ok(sub.remaining_usage - amount)
}

#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn LifecycleStore>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn LifecycleStore>) -> Self {
        Self { store }
    }

    pub async fn remaining_usage(&self, user_id: Uuid) -> Result<i32, StoreError> {
        let mut tx = self.store.begin().await?;
        let now = OffsetDateTime::now_utc();
        let remaining = tx
            .get_active_subscription(user_id, now)
            .await?
            .map_or(0, |s| s.remaining_usage);
        Ok(remaining)
    }

    /// Returns the usage left after the charge.
    #[instrument(skip(self))]
    pub async fn consume(&self, user_id: Uuid, amount: i32) -> Result<i32, QuotaError> {
        let mut tx = self.store.begin().await?;
        let left = consume_in(tx.as_mut(), user_id, amount, OffsetDateTime::now_utc()).await?;
        tx.commit().await?;
        Ok(left)
    }
}
