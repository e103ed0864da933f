//! Shipment status transition table.
//!
//! Every status change goes through [`decide`], which is pure: given the
//! shipment's current status, its sender and partner, the acting user and the
//! requested action it returns the next status and partner binding, or the
//! reason the action is refused.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo_types::{Actor, UserRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "item_status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Posted,
    Requested,
    Approved,
    Picked,
    InTransit,
    Arrived,
    WaitingConfirmation,
    Delivered,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 8] = [
        ItemStatus::Posted,
        ItemStatus::Requested,
        ItemStatus::Approved,
        ItemStatus::Picked,
        ItemStatus::InTransit,
        ItemStatus::Arrived,
        ItemStatus::WaitingConfirmation,
        ItemStatus::Delivered,
    ];

    /// Progress weight, also used as the ordering of the lifecycle.
    pub fn weight(self) -> u8 {
        match self {
            ItemStatus::Posted => 10,
            ItemStatus::Requested => 20,
            ItemStatus::Approved => 30,
            ItemStatus::Picked => 45,
            ItemStatus::InTransit => 65,
            ItemStatus::Arrived => 85,
            ItemStatus::WaitingConfirmation => 90,
            ItemStatus::Delivered => 100,
        }
    }

    /// The picker has the parcel in hand.
    pub fn is_picked_up(self) -> bool {
        self.weight() >= ItemStatus::Picked.weight()
    }

    pub fn is_terminal(self) -> bool {
        self == ItemStatus::Delivered
    }

    /// Whether a shipment in this status must have a partner bound.
    pub fn has_partner(self) -> bool {
        self != ItemStatus::Posted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Posted => "POSTED",
            ItemStatus::Requested => "REQUESTED",
            ItemStatus::Approved => "APPROVED",
            ItemStatus::Picked => "PICKED",
            ItemStatus::InTransit => "IN_TRANSIT",
            ItemStatus::Arrived => "ARRIVED",
            ItemStatus::WaitingConfirmation => "WAITING_CONFIRMATION",
            ItemStatus::Delivered => "DELIVERED",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Picker asks to carry a posted shipment.
    Claim,
    /// Sender accepts the pending request.
    Approve,
    /// Sender turns down the pending request, shipment returns to the market.
    Reject,
    /// Partner confirms the parcel is locked for the trip.
    ConfirmReady,
    /// Partner reports progress.
    Advance(ItemStatus),
    /// Sender confirms the parcel arrived.
    ConfirmReceipt,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Claim => f.write_str("claim"),
            Action::Approve => f.write_str("approve"),
            Action::Reject => f.write_str("reject"),
            Action::ConfirmReady => f.write_str("confirm ready"),
            Action::Advance(to) => write!(f, "advance to {to}"),
            Action::ConfirmReceipt => f.write_str("confirm receipt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartnerUpdate {
    Keep,
    Bind(Uuid),
    Clear,
}

impl PartnerUpdate {
    pub fn apply(self, current: Option<Uuid>) -> Option<Uuid> {
        match self {
            PartnerUpdate::Keep => current,
            PartnerUpdate::Bind(id) => Some(id),
            PartnerUpdate::Clear => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: ItemStatus,
    pub partner: PartnerUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("shipment is {0} and can no longer change")]
    Terminal(ItemStatus),
    #[error("cannot {action} a shipment in status {from}")]
    Invalid { from: ItemStatus, action: Action },
    #[error("cannot move a shipment from {from} back to {to}")]
    Regression { from: ItemStatus, to: ItemStatus },
    #[error("{role} accounts may not {action}")]
    RoleNotAllowed { role: UserRole, action: Action },
    #[error("only the shipment's {0} may do this")]
    NotParticipant(&'static str),
}

/// The parts of a shipment the transition rules look at.
#[derive(Debug, Clone, Copy)]
pub struct ShipmentState {
    pub status: ItemStatus,
    pub sender_id: Uuid,
    pub partner_id: Option<Uuid>,
}

pub fn decide(
    shipment: ShipmentState,
    actor: Actor,
    action: Action,
) -> Result<Transition, TransitionError> {
    let from = shipment.status;
    if from.is_terminal() {
        return Err(TransitionError::Terminal(from));
    }

    let required_role = match action {
        Action::Claim | Action::ConfirmReady | Action::Advance(_) => UserRole::Picker,
        Action::Approve | Action::Reject | Action::ConfirmReceipt => UserRole::Sender,
    };
    if actor.role != required_role {
        return Err(TransitionError::RoleNotAllowed {
            role: actor.role,
            action,
        });
    }

    let invalid = TransitionError::Invalid { from, action };
    match action {
        Action::Claim => {
            if from != ItemStatus::Posted {
                return Err(invalid);
            }
            Ok(Transition {
                next: ItemStatus::Requested,
                partner: PartnerUpdate::Bind(actor.id),
            })
        }
        Action::Approve | Action::Reject => {
            ensure_sender(shipment, actor)?;
            if from != ItemStatus::Requested {
                return Err(invalid);
            }
            Ok(if action == Action::Approve {
                Transition {
                    next: ItemStatus::Picked,
                    partner: PartnerUpdate::Keep,
                }
            } else {
                Transition {
                    next: ItemStatus::Posted,
                    partner: PartnerUpdate::Clear,
                }
            })
        }
        Action::ConfirmReady => {
            ensure_partner(shipment, actor)?;
            if !matches!(from, ItemStatus::Approved | ItemStatus::Picked) {
                return Err(invalid);
            }
            Ok(Transition {
                next: ItemStatus::Picked,
                partner: PartnerUpdate::Keep,
            })
        }
        Action::Advance(to) => {
            ensure_partner(shipment, actor)?;
            if to.weight() <= from.weight() {
                return Err(TransitionError::Regression { from, to });
            }
            let advanceable = matches!(
                from,
                ItemStatus::Approved | ItemStatus::Picked | ItemStatus::InTransit | ItemStatus::Arrived
            );
            let reportable = matches!(
                to,
                ItemStatus::InTransit | ItemStatus::Arrived | ItemStatus::WaitingConfirmation
            );
            if !advanceable || !reportable {
                return Err(invalid);
            }
            Ok(Transition {
                next: to,
                partner: PartnerUpdate::Keep,
            })
        }
        Action::ConfirmReceipt => {
            ensure_sender(shipment, actor)?;
            if from != ItemStatus::WaitingConfirmation {
                return Err(invalid);
            }
            Ok(Transition {
                next: ItemStatus::Delivered,
                partner: PartnerUpdate::Keep,
            })
        }
    }
}

fn ensure_sender(shipment: ShipmentState, actor: Actor) -> Result<(), TransitionError> {
    if shipment.sender_id != actor.id {
        return Err(TransitionError::NotParticipant("sender"));
    }
    Ok(())
}

fn ensure_partner(shipment: ShipmentState, actor: Actor) -> Result<(), TransitionError> {
    if shipment.partner_id != Some(actor.id) {
        return Err(TransitionError::NotParticipant("partner"));
    }
    Ok(())
}
