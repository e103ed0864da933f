use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Conversation between two users, optionally about one shipment.
/// Participants are stored in ascending id order.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MessageThread {
    pub id: Uuid,
    pub shipment_id: Option<Uuid>,
    pub participant1_id: Uuid,
    pub participant2_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Thread row as listed in a user's inbox.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ThreadSummary {
    pub id: Uuid,
    pub shipment_id: Option<Uuid>,
    pub participant1_id: Uuid,
    pub participant2_id: Uuid,
    pub last_message: Option<String>,
    pub unread_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub shipment_id: Option<Uuid>,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
