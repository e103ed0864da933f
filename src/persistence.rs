//! Transactional store contract used by the shipment lifecycle and the quota
//! ledger. A [`LifecycleTx`] that is dropped without [`LifecycleTx::commit`]
//! rolls back every write made through it.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::shipments::repo_types::{NewShipment, Shipment};
use crate::shipments::status::ItemStatus;
use crate::subscriptions::repo_types::SubscriptionTransaction;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("user {0} not found")]
    MissingUser(Uuid),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait LifecycleStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LifecycleTx>, StoreError>;
}

/// Rows are locked in one global order: shipment, then user, then the
/// user's subscription transactions. Every writer takes them in that order,
/// skipping the ones it does not touch.
#[async_trait]
pub trait LifecycleTx: Send {
    /// Reads a shipment and holds it against concurrent writers until the
    /// transaction ends.
    async fn get_shipment(&mut self, id: Uuid) -> Result<Option<Shipment>, StoreError>;

    async fn insert_shipment(
        &mut self,
        new: NewShipment,
        now: OffsetDateTime,
    ) -> Result<Shipment, StoreError>;

    /// Moves `id` to `next` only if it is still in `expected`. Returns the
    /// updated row, or `None` when the status no longer matched.
    async fn compare_and_swap_status(
        &mut self,
        id: Uuid,
        expected: ItemStatus,
        next: ItemStatus,
        partner_id: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Shipment>, StoreError>;

    /// Locks the user row until the transaction ends.
    async fn lock_user(&mut self, user_id: Uuid) -> Result<(), StoreError>;

    async fn get_active_subscription(
        &mut self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<SubscriptionTransaction>, StoreError>;

    /// Decrements by `amount` only if at least `amount` remains.
    async fn decrement_quota(
        &mut self,
        subscription_id: Uuid,
        amount: i32,
    ) -> Result<bool, StoreError>;

    /// Credits a finished delivery to the partner's record.
    async fn record_delivery(&mut self, partner_id: Uuid, fee: f64) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
