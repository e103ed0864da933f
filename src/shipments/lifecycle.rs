//! Shipment lifecycle service: the only place that changes a shipment's
//! status, and the only place that charges quota for shipment actions.
//!
//! Each operation runs in one store transaction. Errors drop the transaction,
//! so a failed claim never keeps its quota charge. Notifications go out after
//! commit.

use std::sync::Arc;

use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::notifications::notifier::{notify_best_effort, NotificationEvent, Notifier};
use crate::persistence::{LifecycleStore, StoreError};
use crate::shipments::repo_types::{NewShipment, Shipment};
use crate::shipments::status::{decide, Action, ItemStatus, TransitionError};
use crate::subscriptions::ledger::{consume_in, QuotaError};
use crate::users::directory::IdentityDirectory;
use crate::users::repo_types::{Actor, UserRole, VerificationStatus};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("shipment {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("quota exceeded: {remaining} remaining")]
    QuotaExceeded { remaining: i32 },
    #[error("verification is under review")]
    VerificationPending,
    #[error("shipment already taken")]
    AlreadyTaken,
    #[error("shipment changed concurrently, refresh and retry")]
    Conflict,
    #[error("{0} accounts may not post shipments")]
    PostingNotAllowed(UserRole),
    #[error("invalid shipment: {0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<QuotaError> for LifecycleError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::Exceeded { remaining, .. } => LifecycleError::QuotaExceeded { remaining },
            QuotaError::Store(e) => LifecycleError::Store(e),
        }
    }
}

#[derive(Clone)]
pub struct LifecycleService {
    store: Arc<dyn LifecycleStore>,
    identity: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn LifecycleStore>,
        identity: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            identity,
            notifier,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Shipment, LifecycleError> {
        let mut tx = self.store.begin().await?;
        tx.get_shipment(id).await?.ok_or(LifecycleError::NotFound(id))
    }

    /// Posts a new shipment for `actor`, charging one unit of the sender's quota.
    #[instrument(skip(self, new), fields(sender_id = %actor.id))]
    pub async fn post(&self, actor: Actor, mut new: NewShipment) -> Result<Shipment, LifecycleError> {
        if actor.role != UserRole::Sender {
            return Err(LifecycleError::PostingNotAllowed(actor.role));
        }
        new.sender_id = actor.id;
        super::services::validate_new_shipment(&new).map_err(LifecycleError::Validation)?;

        let now = OffsetDateTime::now_utc();
        let mut tx = self.store.begin().await?;
        consume_in(tx.as_mut(), actor.id, 1, now).await?;
        let shipment = tx.insert_shipment(new, now).await?;
        tx.commit().await?;

        info!(shipment_id = %shipment.id, "shipment posted");
        Ok(shipment)
    }

    /// Picker claims a posted shipment.
    #[instrument(skip(self), fields(picker_id = %actor.id))]
    pub async fn claim(&self, actor: Actor, id: Uuid) -> Result<Shipment, LifecycleError> {
        if actor.role == UserRole::Picker
            && self.identity.verification_status(actor.id).await? == VerificationStatus::Pending
        {
            return Err(LifecycleError::VerificationPending);
        }

        let now = OffsetDateTime::now_utc();
        let mut tx = self.store.begin().await?;
        let current = tx.get_shipment(id).await?.ok_or(LifecycleError::NotFound(id))?;
        // the only non-terminal refusal of a claim by a picker is a taken shipment
        let transition = decide(current.state(), actor, Action::Claim).map_err(|e| match e {
            TransitionError::Invalid { .. } => LifecycleError::AlreadyTaken,
            other => other.into(),
        })?;

        consume_in(tx.as_mut(), actor.id, 1, now).await?;
        let updated = tx
            .compare_and_swap_status(
                id,
                ItemStatus::Posted,
                transition.next,
                transition.partner.apply(current.partner_id),
                now,
            )
            .await?
            .ok_or(LifecycleError::AlreadyTaken)?;
        tx.commit().await?;

        info!(shipment_id = %id, "shipment claimed");
        self.emit(updated.sender_id, NotificationEvent::RequestCreated, &updated)
            .await;
        Ok(updated)
    }

    /// Sender accepts the pending request. No quota effect.
    pub async fn approve(&self, actor: Actor, id: Uuid) -> Result<Shipment, LifecycleError> {
        let (before, after) = self.apply(actor, id, Action::Approve).await?;
        if let Some(partner) = before.partner_id {
            self.emit(partner, NotificationEvent::RequestApproved, &after).await;
        }
        Ok(after)
    }

    /// Sender turns the request down. The picker's quota unit is not refunded.
    pub async fn reject(&self, actor: Actor, id: Uuid) -> Result<Shipment, LifecycleError> {
        let (before, after) = self.apply(actor, id, Action::Reject).await?;
        if let Some(partner) = before.partner_id {
            self.emit(partner, NotificationEvent::RequestRejected, &after).await;
        }
        Ok(after)
    }

    pub async fn confirm_ready(&self, actor: Actor, id: Uuid) -> Result<Shipment, LifecycleError> {
        let (_, after) = self.apply(actor, id, Action::ConfirmReady).await?;
        Ok(after)
    }

    pub async fn advance(
        &self,
        actor: Actor,
        id: Uuid,
        to: ItemStatus,
    ) -> Result<Shipment, LifecycleError> {
        let (_, after) = self.apply(actor, id, Action::Advance(to)).await?;
        self.emit(after.sender_id, NotificationEvent::StatusAdvanced, &after)
            .await;
        Ok(after)
    }

    /// Sender confirms receipt. Credits the partner in the same transaction.
    pub async fn confirm_receipt(&self, actor: Actor, id: Uuid) -> Result<Shipment, LifecycleError> {
        let (_, after) = self.apply(actor, id, Action::ConfirmReceipt).await?;
        if let Some(partner) = after.partner_id {
            self.emit(partner, NotificationEvent::Delivered, &after).await;
        }
        Ok(after)
    }

    #[instrument(skip(self, actor), fields(actor_id = %actor.id))]
    async fn apply(
        &self,
        actor: Actor,
        id: Uuid,
        action: Action,
    ) -> Result<(Shipment, Shipment), LifecycleError> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.store.begin().await?;
        let before = tx.get_shipment(id).await?.ok_or(LifecycleError::NotFound(id))?;
        let transition = decide(before.state(), actor, action).map_err(|e| {
            warn!(shipment_id = %id, status = %before.status, error = %e, "transition refused");
            e
        })?;

        let after = tx
            .compare_and_swap_status(
                id,
                before.status,
                transition.next,
                transition.partner.apply(before.partner_id),
                now,
            )
            .await?
            .ok_or(LifecycleError::Conflict)?;

        if after.status == ItemStatus::Delivered {
            if let Some(partner) = after.partner_id {
                tx.record_delivery(partner, after.fee).await?;
            }
        }
        tx.commit().await?;

        info!(shipment_id = %id, from = %before.status, to = %after.status, "shipment status changed");
        Ok((before, after))
    }

    async fn emit(&self, user_id: Uuid, event: NotificationEvent, shipment: &Shipment) {
        notify_best_effort(
            self.notifier.as_ref(),
            user_id,
            event,
            json!({ "shipment_id": shipment.id, "status": shipment.status }),
        )
        .await;
    }
}
