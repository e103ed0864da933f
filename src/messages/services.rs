use uuid::Uuid;

use super::repo_types::MessageThread;

pub const MAX_MESSAGE_LEN: usize = 2000;

/// Storage order of a participant pair.
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

pub(crate) fn validate_participants(me: Uuid, other: Uuid) -> Result<(), String> {
    if me == other {
        return Err("cannot open a thread with yourself".into());
    }
    Ok(())
}

/// A shipment thread must include the shipment's sender.
pub fn may_anchor(shipment_sender: Uuid, a: Uuid, b: Uuid) -> bool {
    shipment_sender == a || shipment_sender == b
}

/// Trimmed message text, or a validation message.
pub(crate) fn validate_text(text: &str) -> Result<String, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("text is required".into());
    }
    if text.chars().count() > MAX_MESSAGE_LEN {
        return Err(format!("text is longer than {MAX_MESSAGE_LEN} characters"));
    }
    Ok(text.to_string())
}

impl MessageThread {
    /// The other participant, `None` when `user_id` is not in the thread.
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if user_id == self.participant1_id {
            Some(self.participant2_id)
        } else if user_id == self.participant2_id {
            Some(self.participant1_id)
        } else {
            None
        }
    }
}
