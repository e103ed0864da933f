use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::shipments::status::{ItemStatus, ShipmentState};

/// Shipment record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Shipment {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub partner_id: Option<Uuid>, // set iff status is REQUESTED or later
    pub category: Option<String>,
    pub description: Option<String>,
    pub pickup_country: String,
    pub dest_country: String,
    pub address: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub weight: f64,
    pub fee: f64,
    pub notes: Option<String>,
    pub status: ItemStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub picked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub available_from: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub available_until: Option<OffsetDateTime>,
    pub images: Vec<String>, // object store keys
}

impl Shipment {
    pub fn state(&self) -> ShipmentState {
        ShipmentState {
            status: self.status,
            sender_id: self.sender_id,
            partner_id: self.partner_id,
        }
    }
}

/// Validated input for a new posting.
#[derive(Debug, Clone)]
pub struct NewShipment {
    pub sender_id: Uuid,
    pub category: Option<String>,
    pub description: Option<String>,
    pub pickup_country: String,
    pub dest_country: String,
    pub address: String,
    pub receiver_name: String,
    pub receiver_phone: String,
    pub weight: f64,
    pub fee: f64,
    pub notes: Option<String>,
    pub available_from: Option<OffsetDateTime>,
    pub available_until: Option<OffsetDateTime>,
    pub images: Vec<String>,
}

/// Picked-at stamp after a move to `next`.
pub fn picked_at_after(
    current: Option<OffsetDateTime>,
    next: ItemStatus,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    match next {
        ItemStatus::Posted => None,
        next if next.is_picked_up() => current.or(Some(now)),
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn first_move_past_pickup_stamps_picked_at() {
        let now = OffsetDateTime::now_utc();
        let earlier = now - Duration::hours(3);

        assert_eq!(picked_at_after(None, ItemStatus::Picked, now), Some(now));
        assert_eq!(picked_at_after(None, ItemStatus::InTransit, now), Some(now));
        assert_eq!(picked_at_after(Some(earlier), ItemStatus::Arrived, now), Some(earlier));
        assert_eq!(picked_at_after(None, ItemStatus::Requested, now), None);
        assert_eq!(picked_at_after(Some(earlier), ItemStatus::Posted, now), None);
    }
}
