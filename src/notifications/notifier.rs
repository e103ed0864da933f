use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationEvent {
    RequestCreated,
    RequestApproved,
    RequestRejected,
    StatusAdvanced,
    Delivered,
    SubscriptionActivated,
    VerificationDecided,
    MessageReceived,
}

/// Side-effect sink for lifecycle and account events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: Uuid, event: NotificationEvent, payload: Value) -> anyhow::Result<()>;
}

/// Delivery is best effort: a failed notification never fails its trigger.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    user_id: Uuid,
    event: NotificationEvent,
    payload: Value,
) {
    if let Err(e) = notifier.notify(user_id, event, payload).await {
        warn!(error = %e, %user_id, ?event, "notification dropped");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub title: String,
    pub message: String,
    pub kind: &'static str,
    pub link: Option<String>,
}

pub fn render(event: NotificationEvent, payload: &Value) -> Rendered {
    let shipment_link = payload
        .get("shipment_id")
        .and_then(Value::as_str)
        .map(|id| format!("/shipments/{id}"));
    let status = payload.get("status").and_then(Value::as_str).unwrap_or("updated");

    match event {
        NotificationEvent::RequestCreated => Rendered {
            title: "New pickup request".into(),
            message: "A picker has requested to carry your shipment.".into(),
            kind: "INFO",
            link: shipment_link,
        },
        NotificationEvent::RequestApproved => Rendered {
            title: "Request approved".into(),
            message: "The sender approved your request. The shipment is locked for your trip.".into(),
            kind: "SUCCESS",
            link: shipment_link,
        },
        NotificationEvent::RequestRejected => Rendered {
            title: "Request declined".into(),
            message: "The sender declined your request. The shipment is back on the marketplace.".into(),
            kind: "WARNING",
            link: shipment_link,
        },
        NotificationEvent::StatusAdvanced => Rendered {
            title: "Shipment update".into(),
            message: format!("Your shipment is now {status}."),
            kind: "INFO",
            link: shipment_link,
        },
        NotificationEvent::Delivered => Rendered {
            title: "Delivery confirmed".into(),
            message: "The sender confirmed receipt. Delivery complete.".into(),
            kind: "SUCCESS",
            link: shipment_link,
        },
        NotificationEvent::SubscriptionActivated => {
            let plan = payload.get("plan_name").and_then(Value::as_str).unwrap_or("your plan");
            Rendered {
                title: "Subscription active".into(),
                message: format!("{plan} is now active."),
                kind: "SUCCESS",
                link: Some("/billing".into()),
            }
        }
        NotificationEvent::VerificationDecided => {
            let approved = payload.get("approved").and_then(Value::as_bool).unwrap_or(false);
            if approved {
                Rendered {
                    title: "Verification complete".into(),
                    message: "Your identity is verified. You now have full access.".into(),
                    kind: "SUCCESS",
                    link: Some("/profile".into()),
                }
            } else {
                Rendered {
                    title: "Verification declined".into(),
                    message: "Your documents could not be verified. Please submit them again.".into(),
                    kind: "WARNING",
                    link: Some("/profile".into()),
                }
            }
        }
        NotificationEvent::MessageReceived => Rendered {
            title: "New message".into(),
            message: "You have a new message.".into(),
            kind: "INFO",
            link: payload
                .get("thread_id")
                .and_then(Value::as_str)
                .map(|id| format!("/messages/{id}")),
        },
    }
}

/// Writes events into the `notifications` table, read back by clients polling
/// `/notifications`.
#[derive(Clone)]
pub struct DbNotifier {
    db: PgPool,
}

impl DbNotifier {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Notifier for DbNotifier {
    async fn notify(&self, user_id: Uuid, event: NotificationEvent, payload: Value) -> anyhow::Result<()> {
        let r = render(event, &payload);
        super::repo::insert(&self.db, user_id, &r).await?;
        debug!(%user_id, ?event, "notification stored");
        Ok(())
    }
}
