use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::shipments::repo_types::{NewShipment, Shipment};
use crate::shipments::status::ItemStatus;

#[derive(Debug, Deserialize)]
pub struct CreateShipmentRequest {
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
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub available_from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub available_until: Option<OffsetDateTime>,
    #[serde(default)]
    pub images: Vec<String>, // keys from /shipments/images/upload-url
}

impl CreateShipmentRequest {
    pub fn into_new(self, sender_id: Uuid) -> NewShipment {
        NewShipment {
            sender_id,
            category: self.category,
            description: self.description,
            pickup_country: self.pickup_country.trim().to_string(),
            dest_country: self.dest_country.trim().to_string(),
            address: self.address,
            receiver_name: self.receiver_name,
            receiver_phone: self.receiver_phone,
            weight: self.weight,
            fee: self.fee,
            notes: self.notes,
            available_from: self.available_from,
            available_until: self.available_until,
            images: self.images,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShipmentView {
    #[serde(flatten)]
    pub shipment: Shipment,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
}

impl From<Shipment> for ShipmentView {
    fn from(shipment: Shipment) -> Self {
        Self {
            progress: shipment.status.weight(),
            shipment,
            image_urls: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdvanceRequest {
    pub status: ItemStatus,
}

#[derive(Debug, Deserialize)]
pub struct MarketplaceQuery {
    pub pickup_country: Option<String>,
    pub dest_country: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Pagination {
    /// Limit clamped to 1..=100, offset to >= 0.
    pub fn clamped(&self) -> (i64, i64) {
        (self.limit.clamp(1, 100), self.offset.max(0))
    }
}

fn default_limit() -> i64 { 20 }

#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    pub key: String,
    pub upload_url: String,
}
