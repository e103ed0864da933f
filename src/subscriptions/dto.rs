use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subscriptions::repo_types::{
    PaymentMethod, SubscriptionPlan, SubscriptionTransaction, TransactionStatus,
};
use crate::subscriptions::services::{validate_plan, SubscriptionError};
use crate::users::repo_types::UserRole;

#[derive(Debug, Deserialize)]
pub struct PlanQuery {
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub price: f64,
    pub usage_limit: i32,
    pub role: UserRole,
    #[serde(default = "default_duration_days")]
    pub duration_days: i32,
    pub description: Option<String>,
}

fn default_duration_days() -> i32 { 30 }

/// Partial plan edit. Absent fields keep their current value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePlanRequest {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub usage_limit: Option<i32>,
    pub role: Option<UserRole>,
    pub duration_days: Option<i32>,
    pub description: Option<String>,
}

impl UpdatePlanRequest {
    /// The plan as it would look after the edit, validated as a whole.
    pub fn apply_to(self, current: &SubscriptionPlan) -> Result<SubscriptionPlan, SubscriptionError> {
        let plan = SubscriptionPlan {
            id: current.id,
            name: self.name.map(|n| n.trim().to_string()).unwrap_or_else(|| current.name.clone()),
            price: self.price.unwrap_or(current.price),
            usage_limit: self.usage_limit.unwrap_or(current.usage_limit),
            role: self.role.unwrap_or(current.role),
            duration_days: self.duration_days.unwrap_or(current.duration_days),
            description: self.description.or_else(|| current.description.clone()),
        };
        validate_plan(&plan.name, plan.price, plan.usage_limit, plan.role, plan.duration_days)?;
        Ok(plan)
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: Uuid,
    pub payment_method: PaymentMethod,
    pub transaction_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub status: TransactionStatus,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub status: Option<TransactionStatus>,
}

#[derive(Debug, Serialize)]
pub struct MySubscriptions {
    pub active: Option<SubscriptionTransaction>,
    pub remaining_usage: i32,
    pub history: Vec<SubscriptionTransaction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn plan() -> SubscriptionPlan {
        SubscriptionPlan {
            id: Uuid::new_v4(),
            name: "Courier Pro".into(),
            price: 250.0,
            usage_limit: 20,
            role: UserRole::Picker,
            duration_days: 30,
            description: Some("twenty claims".into()),
        }
    }

    #[test]
    fn plan_edits_keep_untouched_fields() {
        let current = plan();
        let edit = UpdatePlanRequest {
            price: Some(300.0),
            name: Some("  Courier Max ".into()),
            ..Default::default()
        };
        let next = edit.apply_to(&current).unwrap();
        assert_eq!(next.id, current.id);
        assert_eq!(next.name, "Courier Max");
        assert_eq!(next.price, 300.0);
        assert_eq!(next.usage_limit, 20);
        assert_eq!(next.role, UserRole::Picker);
        assert_eq!(next.description.as_deref(), Some("twenty claims"));
    }

    #[test]
    fn plan_edits_are_validated_as_a_whole() {
        let edit = UpdatePlanRequest { role: Some(UserRole::Admin), ..Default::default() };
        assert!(matches!(edit.apply_to(&plan()), Err(SubscriptionError::InvalidPlan(_))));

        let edit = UpdatePlanRequest { duration_days: Some(0), ..Default::default() };
        assert!(matches!(edit.apply_to(&plan()), Err(SubscriptionError::InvalidPlan(_))));
    }
}
