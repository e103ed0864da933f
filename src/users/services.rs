use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::shipments::services::{ext_from_mime, is_valid_phone};
use crate::state::AppState;
use crate::users::dto::{RegisterProfileRequest, SubmitVerificationRequest};
use crate::users::repo_types::{UserRole, VerificationStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("verification is already under review")]
    AlreadyPending,
    #[error("account is already verified")]
    AlreadyVerified,
    #[error("no verification is waiting for review")]
    NotPending,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Normalizes and checks a registration, returning a message on failure.
pub(crate) fn validate_registration(req: &mut RegisterProfileRequest) -> Result<(), String> {
    req.email = req.email.trim().to_lowercase();
    req.first_name = req.first_name.trim().to_string();
    req.last_name = req.last_name.trim().to_string();

    if req.role == UserRole::Admin {
        return Err("role must be SENDER or PICKER".into());
    }
    if req.first_name.is_empty() || req.last_name.is_empty() {
        return Err("first_name and last_name are required".into());
    }
    if !is_valid_email(&req.email) {
        return Err("invalid email".into());
    }
    if let Some(phone) = req.phone_number.as_deref() {
        if !is_valid_phone(phone) {
            return Err("invalid phone_number".into());
        }
    }
    Ok(())
}

const DOCUMENT_UPLOAD_TTL_SECS: u64 = 15 * 60;

/// Documents must be present and uploaded through the user's own slots.
pub(crate) fn validate_documents(
    user_id: Uuid,
    req: &SubmitVerificationRequest,
) -> Result<(), String> {
    if req.id_type.trim().is_empty() {
        return Err("id_type is required".into());
    }
    if req.id_front_key.trim().is_empty() || req.selfie_key.trim().is_empty() {
        return Err("id_front_key and selfie_key are required".into());
    }
    let owned_prefix = document_prefix(user_id);
    let keys = [Some(&req.id_front_key), req.id_back_key.as_ref(), Some(&req.selfie_key)];
    if let Some(key) = keys.into_iter().flatten().find(|k| !k.starts_with(&owned_prefix)) {
        return Err(format!("document {key} was not uploaded by this user"));
    }
    Ok(())
}

fn document_prefix(user_id: Uuid) -> String {
    format!("verification/{user_id}/")
}

/// Object key and presigned PUT url for one identity document.
pub async fn document_upload_slot(
    st: &AppState,
    user_id: Uuid,
    content_type: &str,
) -> anyhow::Result<(String, String)> {
    let ext = ext_from_mime(content_type).context("unsupported document type")?;
    let key = format!("{}{}.{}", document_prefix(user_id), Uuid::new_v4(), ext);
    let url = st
        .storage
        .presign_put(&key, content_type, DOCUMENT_UPLOAD_TTL_SECS)
        .await
        .with_context(|| format!("presign upload {}", key))?;
    Ok((key, url))
}

/// UNVERIFIED -> PENDING.
pub fn on_submit(current: VerificationStatus) -> Result<VerificationStatus, VerificationError> {
    match current {
        VerificationStatus::Unverified => Ok(VerificationStatus::Pending),
        VerificationStatus::Pending => Err(VerificationError::AlreadyPending),
        VerificationStatus::Verified => Err(VerificationError::AlreadyVerified),
    }
}

/// PENDING -> VERIFIED on approval, back to UNVERIFIED otherwise.
pub fn on_review(
    current: VerificationStatus,
    approve: bool,
) -> Result<VerificationStatus, VerificationError> {
    if current != VerificationStatus::Pending {
        return Err(VerificationError::NotPending);
    }
    Ok(if approve {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Unverified
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(role: UserRole) -> RegisterProfileRequest {
        RegisterProfileRequest {
            first_name: " Selam ".into(),
            last_name: "Bekele".into(),
            email: " Selam@Example.COM ".into(),
            phone_number: Some("+251911234567".into()),
            role,
        }
    }

    #[test]
    fn registration_is_normalized() {
        let mut req = registration(UserRole::Picker);
        assert_eq!(validate_registration(&mut req), Ok(()));
        assert_eq!(req.email, "selam@example.com");
        assert_eq!(req.first_name, "Selam");
    }

    #[test]
    fn admins_cannot_self_register() {
        let mut req = registration(UserRole::Admin);
        assert!(validate_registration(&mut req).unwrap_err().contains("SENDER or PICKER"));
    }

    #[test]
    fn registration_rejects_bad_contact_details() {
        let mut req = registration(UserRole::Sender);
        req.email = "nope".into();
        assert_eq!(validate_registration(&mut req).unwrap_err(), "invalid email");

        let mut req = registration(UserRole::Sender);
        req.phone_number = Some("12".into());
        assert_eq!(validate_registration(&mut req).unwrap_err(), "invalid phone_number");
    }

    #[test]
    fn submission_only_from_unverified() {
        assert_eq!(on_submit(VerificationStatus::Unverified), Ok(VerificationStatus::Pending));
        assert_eq!(on_submit(VerificationStatus::Pending), Err(VerificationError::AlreadyPending));
        assert_eq!(on_submit(VerificationStatus::Verified), Err(VerificationError::AlreadyVerified));
    }

    #[test]
    fn review_only_of_pending() {
        assert_eq!(on_review(VerificationStatus::Pending, true), Ok(VerificationStatus::Verified));
        assert_eq!(on_review(VerificationStatus::Pending, false), Ok(VerificationStatus::Unverified));
        assert_eq!(on_review(VerificationStatus::Verified, false), Err(VerificationError::NotPending));
        assert_eq!(on_review(VerificationStatus::Unverified, true), Err(VerificationError::NotPending));
    }

    fn documents(owner: Uuid) -> SubmitVerificationRequest {
        SubmitVerificationRequest {
            id_type: "passport".into(),
            id_front_key: format!("verification/{owner}/front.jpg"),
            id_back_key: None,
            selfie_key: format!("verification/{owner}/selfie.jpg"),
        }
    }

    #[test]
    fn documents_must_be_present() {
        let user = Uuid::new_v4();
        let mut req = documents(user);
        assert_eq!(validate_documents(user, &req), Ok(()));
        req.selfie_key = " ".into();
        assert!(validate_documents(user, &req).is_err());
    }

    #[test]
    fn documents_of_other_users_are_refused() {
        let user = Uuid::new_v4();
        let victim = Uuid::new_v4();

        let err = validate_documents(user, &documents(victim)).unwrap_err();
        assert!(err.contains("not uploaded by this user"));

        let mut req = documents(user);
        req.selfie_key = format!("shipments/{victim}/x.jpg");
        assert!(validate_documents(user, &req).is_err());

        let mut req = documents(user);
        req.id_back_key = Some(format!("verification/{victim}/back.jpg"));
        assert!(validate_documents(user, &req).is_err());

        let mut req = documents(user);
        req.id_back_key = Some(format!("verification/{user}/back.jpg"));
        assert_eq!(validate_documents(user, &req), Ok(()));
    }
}
