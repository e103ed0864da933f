use serde::Deserialize;
use uuid::Uuid;

use crate::users::repo_types::UserRole;

use super::notifier::Rendered;

const KINDS: [&str; 4] = ["INFO", "SUCCESS", "WARNING", "ERROR"];

/// Who receives an admin broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "target_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BroadcastTarget {
    All,
    Role { roles: Vec<UserRole> },
    Users { user_ids: Vec<Uuid> },
    /// Pickers who carried a shipment from or to the location.
    LocationHistory { location: String },
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub title: String,
    pub message: String,
    #[serde(default = "default_kind", alias = "type")]
    pub kind: String,
    pub link: Option<String>,
    #[serde(flatten)]
    pub target: BroadcastTarget,
}

fn default_kind() -> String {
    "INFO".into()
}

/// Checks a broadcast and renders the notification every target receives.
pub(crate) fn validate_broadcast(req: &BroadcastRequest) -> Result<Rendered, String> {
    let title = req.title.trim();
    let message = req.message.trim();
    if title.is_empty() || message.is_empty() {
        return Err("title and message are required".into());
    }
    let wanted = req.kind.trim().to_uppercase();
    let kind = KINDS
        .into_iter()
        .find(|k| *k == wanted)
        .ok_or_else(|| format!("kind must be one of {}", KINDS.join(", ")))?;

    match &req.target {
        BroadcastTarget::All => {}
        BroadcastTarget::Role { roles } if roles.is_empty() => {
            return Err("roles must not be empty".into())
        }
        BroadcastTarget::Users { user_ids } if user_ids.is_empty() => {
            return Err("user_ids must not be empty".into())
        }
        BroadcastTarget::LocationHistory { location } if location.trim().is_empty() => {
            return Err("location is required".into())
        }
        _ => {}
    }

    Ok(Rendered {
        title: title.to_string(),
        message: message.to_string(),
        kind,
        link: req.link.clone().filter(|l| !l.trim().is_empty()),
    })
}
