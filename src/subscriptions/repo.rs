use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::subscriptions::repo_types::{
    PaymentMethod, SubscriptionPlan, SubscriptionTransaction, TransactionStatus,
};
use crate::subscriptions::services::{
    activation, check_checkout, check_settlement, CheckoutKind, SubscriptionError,
};
use crate::users::repo_types::UserRole;

const PLAN_COLUMNS: &str = "id, name, price, usage_limit, role, duration_days, description";

const TRANSACTION_COLUMNS: &str = r#"
    id, user_id, plan_id, plan_name, amount, payment_method, status, remaining_usage,
    is_active, end_date, transaction_reference, created_at
"#;

pub async fn list_plans(db: &PgPool, role: Option<UserRole>) -> anyhow::Result<Vec<SubscriptionPlan>> {
    let sql = format!(
        "SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE ($1::user_role IS NULL OR role = $1) ORDER BY price"
    );
    let plans = sqlx::query_as::<_, SubscriptionPlan>(&sql)
        .bind(role)
        .fetch_all(db)
        .await?;
    Ok(plans)
}

pub async fn create_plan(
    db: &PgPool,
    name: &str,
    price: f64,
    usage_limit: i32,
    role: UserRole,
    duration_days: i32,
    description: Option<&str>,
) -> anyhow::Result<SubscriptionPlan> {
    let sql = format!(
        r#"
        INSERT INTO subscription_plans (name, price, usage_limit, role, duration_days, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {PLAN_COLUMNS}
        "#
    );
    let plan = sqlx::query_as::<_, SubscriptionPlan>(&sql)
        .bind(name)
        .bind(price)
        .bind(usage_limit)
        .bind(role)
        .bind(duration_days)
        .bind(description)
        .fetch_one(db)
        .await?;
    Ok(plan)
}

pub async fn find_plan(db: &PgPool, id: Uuid) -> anyhow::Result<Option<SubscriptionPlan>> {
    let sql = format!("SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE id = $1");
    let plan = sqlx::query_as::<_, SubscriptionPlan>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(plan)
}

/// Overwrites every editable column of `plan`. `None` when the plan is gone.
pub async fn update_plan(
    db: &PgPool,
    plan: &SubscriptionPlan,
) -> anyhow::Result<Option<SubscriptionPlan>> {
    let sql = format!(
        r#"
        UPDATE subscription_plans
           SET name = $2, price = $3, usage_limit = $4, role = $5,
               duration_days = $6, description = $7
         WHERE id = $1
        RETURNING {PLAN_COLUMNS}
        "#
    );
    let updated = sqlx::query_as::<_, SubscriptionPlan>(&sql)
        .bind(plan.id)
        .bind(&plan.name)
        .bind(plan.price)
        .bind(plan.usage_limit)
        .bind(plan.role)
        .bind(plan.duration_days)
        .bind(plan.description.as_deref())
        .fetch_optional(db)
        .await?;
    Ok(updated)
}

/// Deletes a plan nobody has bought. Plans referenced by transactions are
/// refused with `PlanInUse`.
pub async fn delete_plan(db: &PgPool, id: Uuid) -> Result<(), SubscriptionError> {
    let done = sqlx::query("DELETE FROM subscription_plans WHERE id = $1")
        .bind(id)
        .execute(db)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref d) if d.is_foreign_key_violation() => SubscriptionError::PlanInUse,
            other => SubscriptionError::Database(other),
        })?;
    if done.rows_affected() == 0 {
        return Err(SubscriptionError::NotFound("plan"));
    }
    Ok(())
}

pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<SubscriptionTransaction>> {
    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM subscription_transactions WHERE user_id = $1 ORDER BY created_at DESC"
    );
    let rows = sqlx::query_as::<_, SubscriptionTransaction>(&sql)
        .bind(user_id)
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub async fn list_by_status(
    db: &PgPool,
    status: Option<TransactionStatus>,
) -> anyhow::Result<Vec<SubscriptionTransaction>> {
    let sql = format!(
        r#"
        SELECT {TRANSACTION_COLUMNS}
          FROM subscription_transactions
         WHERE ($1::transaction_status IS NULL OR status = $1)
         ORDER BY created_at DESC
        "#
    );
    let rows = sqlx::query_as::<_, SubscriptionTransaction>(&sql)
        .bind(status)
        .fetch_all(db)
        .await?;
    Ok(rows)
}

/// Records a purchase. Wallet payments are debited and activated in the same
/// transaction; other methods stay PENDING until settled. Locks the user row
/// before the user's subscription rows.
pub async fn checkout(
    db: &PgPool,
    user_id: Uuid,
    plan_id: Uuid,
    method: PaymentMethod,
    reference: String,
) -> Result<SubscriptionTransaction, SubscriptionError> {
    let now = OffsetDateTime::now_utc();
    let mut tx = db.begin().await?;

    let (role, balance) = sqlx::query_as::<_, (UserRole, f64)>(
        r#"SELECT role, wallet_balance FROM users WHERE id = $1 FOR UPDATE"#,
    )
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(SubscriptionError::NotFound("user"))?;

    let plan = find_plan_in_tx(&mut tx, plan_id)
        .await?
        .ok_or(SubscriptionError::NotFound("plan"))?;

    let existing_sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM subscription_transactions WHERE user_id = $1 FOR UPDATE"
    );
    let existing = sqlx::query_as::<_, SubscriptionTransaction>(&existing_sql)
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

    let kind = check_checkout(role, balance, &plan, method, &existing, now)?;

    let insert_sql = format!(
        r#"
        INSERT INTO subscription_transactions
            (user_id, plan_id, plan_name, amount, payment_method, status, transaction_reference, created_at)
        VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7)
        RETURNING {TRANSACTION_COLUMNS}
        "#
    );
    let mut record = sqlx::query_as::<_, SubscriptionTransaction>(&insert_sql)
        .bind(user_id)
        .bind(plan.id)
        .bind(&plan.name)
        .bind(plan.price)
        .bind(method)
        .bind(&reference)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

    if kind == CheckoutKind::Instant {
        sqlx::query(r#"UPDATE users SET wallet_balance = wallet_balance - $2 WHERE id = $1"#)
            .bind(user_id)
            .bind(plan.price)
            .execute(&mut *tx)
            .await?;
        record = activate_in(&mut tx, &record, &plan, now).await?;
    }

    tx.commit().await?;
    Ok(record)
}

/// Settles a pending transaction. Returns the updated record and, when it was
/// activated, the plan it activated.
pub async fn settle(
    db: &PgPool,
    transaction_id: Uuid,
    target: TransactionStatus,
) -> Result<(SubscriptionTransaction, Option<SubscriptionPlan>), SubscriptionError> {
    let now = OffsetDateTime::now_utc();
    let mut tx = db.begin().await?;

    // user row before subscription rows, the same order checkout and quota use
    let owner = sqlx::query_scalar::<_, Uuid>(
        r#"SELECT user_id FROM subscription_transactions WHERE id = $1"#,
    )
    .bind(transaction_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(SubscriptionError::NotFound("transaction"))?;
    sqlx::query(r#"SELECT id FROM users WHERE id = $1 FOR UPDATE"#)
        .bind(owner)
        .execute(&mut *tx)
        .await?;

    let sql = format!(
        "SELECT {TRANSACTION_COLUMNS} FROM subscription_transactions WHERE id = $1 FOR UPDATE"
    );
    let record = sqlx::query_as::<_, SubscriptionTransaction>(&sql)
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(SubscriptionError::NotFound("transaction"))?;

    check_settlement(record.status, target)?;

    let outcome = match target {
        TransactionStatus::Completed => {
            let plan = find_plan_in_tx(&mut tx, record.plan_id)
                .await?
                .ok_or(SubscriptionError::NotFound("plan"))?;
            let updated = activate_in(&mut tx, &record, &plan, now).await?;
            (updated, Some(plan))
        }
        _ => {
            let sql = format!(
                r#"
                UPDATE subscription_transactions
                   SET status = 'REJECTED', is_active = FALSE
                 WHERE id = $1
             RETURNING {TRANSACTION_COLUMNS}
                "#
            );
            let updated = sqlx::query_as::<_, SubscriptionTransaction>(&sql)
                .bind(record.id)
                .fetch_one(&mut *tx)
                .await?;
            (updated, None)
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

/// Deactivates transactions whose end date has passed. Returns how many.
pub async fn deactivate_expired(db: &PgPool, now: OffsetDateTime) -> anyhow::Result<u64> {
    let done = sqlx::query(
        r#"
        UPDATE subscription_transactions
           SET is_active = FALSE
         WHERE is_active AND end_date IS NOT NULL AND end_date < $1
        "#,
    )
    .bind(now)
    .execute(db)
    .await?;
    Ok(done.rows_affected())
}

async fn find_plan_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    plan_id: Uuid,
) -> Result<Option<SubscriptionPlan>, sqlx::Error> {
    let sql = format!("SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE id = $1");
    sqlx::query_as::<_, SubscriptionPlan>(&sql)
        .bind(plan_id)
        .fetch_optional(&mut **tx)
        .await
}

/// Makes `record` the user's only active subscription with the plan's full
/// allowance.
async fn activate_in(
    tx: &mut Transaction<'_, Postgres>,
    record: &SubscriptionTransaction,
    plan: &SubscriptionPlan,
    now: OffsetDateTime,
) -> Result<SubscriptionTransaction, sqlx::Error> {
    let grant = activation(plan, now);

    sqlx::query(
        r#"UPDATE subscription_transactions SET is_active = FALSE WHERE user_id = $1 AND is_active AND id <> $2"#,
    )
    .bind(record.user_id)
    .bind(record.id)
    .execute(&mut **tx)
    .await?;

    let sql = format!(
        r#"
        UPDATE subscription_transactions
           SET status = 'COMPLETED', is_active = TRUE, remaining_usage = $2, end_date = $3
         WHERE id = $1
     RETURNING {TRANSACTION_COLUMNS}
        "#
    );
    let updated = sqlx::query_as::<_, SubscriptionTransaction>(&sql)
        .bind(record.id)
        .bind(grant.remaining_usage)
        .bind(grant.end_date)
        .fetch_one(&mut **tx)
        .await?;

    sqlx::query(r#"UPDATE users SET current_plan_id = $2 WHERE id = $1"#)
        .bind(record.user_id)
        .bind(plan.id)
        .execute(&mut **tx)
        .await?;

    Ok(updated)
}
