use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::{User, UserRole, VerificationStatus};

#[derive(Debug, Deserialize)]
pub struct RegisterProfileRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
pub struct PrivacyRequest {
    pub show_rating: Option<bool>,
    pub show_phone: Option<bool>,
    pub show_email: Option<bool>,
    pub show_delivery_count: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivacyFlags {
    pub show_rating: bool,
    pub show_phone: bool,
    pub show_email: bool,
    pub show_delivery_count: bool,
}

impl PrivacyRequest {
    /// Overlays the requested flags on the current ones.
    pub fn apply_to(&self, user: &User) -> PrivacyFlags {
        PrivacyFlags {
            show_rating: self.show_rating.unwrap_or(user.show_rating),
            show_phone: self.show_phone.unwrap_or(user.show_phone),
            show_email: self.show_email.unwrap_or(user.show_email),
            show_delivery_count: self.show_delivery_count.unwrap_or(user.show_delivery_count),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitVerificationRequest {
    pub id_type: String,
    pub id_front_key: String,
    pub id_back_key: Option<String>,
    pub selfie_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewVerificationRequest {
    pub approve: bool,
}

/// Role-specific part of the own profile.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleProfile {
    Sender {
        items_count_this_month: i32,
        current_plan_id: Option<Uuid>,
    },
    Picker {
        completed_deliveries: i32,
        earnings: f64,
        rating: f64,
    },
    Admin,
}

impl RoleProfile {
    pub fn of(user: &User) -> Self {
        match user.role {
            UserRole::Sender => RoleProfile::Sender {
                items_count_this_month: user.items_count_this_month,
                current_plan_id: user.current_plan_id,
            },
            UserRole::Picker => RoleProfile::Picker {
                completed_deliveries: user.completed_deliveries,
                earnings: user.earnings,
                rating: user.rating,
            },
            UserRole::Admin => RoleProfile::Admin,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: UserRole,
    pub verification_status: VerificationStatus,
    pub wallet_balance: f64,
    pub credit_balance: f64,
    pub remaining_usage: i32,
    pub show_rating: bool,
    pub show_phone: bool,
    pub show_email: bool,
    pub show_delivery_count: bool,
    pub profile: RoleProfile,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl MeResponse {
    pub fn new(user: User, remaining_usage: i32) -> Self {
        Self {
            profile: RoleProfile::of(&user),
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone_number: user.phone_number,
            role: user.role,
            verification_status: user.verification_status,
            wallet_balance: user.wallet_balance,
            credit_balance: user.credit_balance,
            remaining_usage,
            show_rating: user.show_rating,
            show_phone: user.show_phone,
            show_email: user.show_email,
            show_delivery_count: user.show_delivery_count,
            created_at: user.created_at,
        }
    }
}

/// What other users may see. Fields hidden by privacy flags are omitted.
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_deliveries: Option<i32>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name(),
            role: user.role,
            verified: user.verification_status == VerificationStatus::Verified,
            rating: user.show_rating.then_some(user.rating),
            phone_number: user.phone_number.filter(|_| user.show_phone),
            email: user.show_email.then_some(user.email),
            completed_deliveries: user
                .show_delivery_count
                .then_some(user.completed_deliveries),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PendingVerification {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
    pub id_type: Option<String>,
    pub id_front_url: Option<String>,
    pub id_back_url: Option<String>,
    pub selfie_url: Option<String>,
}
