use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::users::dto::{PrivacyFlags, RegisterProfileRequest, SubmitVerificationRequest};
use crate::users::repo_types::{User, VerificationStatus};
use crate::users::services::{on_review, on_submit, VerificationError};

pub(crate) const USER_COLUMNS: &str = r#"
    id, first_name, last_name, email, phone_number, role, verification_status,
    wallet_balance, credit_balance, current_plan_id, items_count_this_month, rating,
    completed_deliveries, earnings, show_rating, show_phone, show_email,
    show_delivery_count, id_type, id_front_key, id_back_key, selfie_key, created_at
"#;

/// Outcome of a guarded verification update.
pub enum VerificationUpdate {
    Done(User),
    Refused(VerificationError),
    Missing,
}

impl User {
    pub async fn find(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user")?;
        Ok(user)
    }

    /// Creates the profile for token subject `id`. `None` when the id or the
    /// email is already registered.
    pub async fn create(
        db: &PgPool,
        id: Uuid,
        req: &RegisterProfileRequest,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            INSERT INTO users (id, first_name, last_name, email, phone_number, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&req.first_name)
            .bind(&req.last_name)
            .bind(&req.email)
            .bind(&req.phone_number)
            .bind(req.role)
            .fetch_optional(db)
            .await
            .context("create user")?;
        Ok(user)
    }

    pub async fn update_privacy(
        db: &PgPool,
        id: Uuid,
        flags: PrivacyFlags,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
               SET show_rating = $2, show_phone = $3, show_email = $4, show_delivery_count = $5
             WHERE id = $1
         RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(flags.show_rating)
            .bind(flags.show_phone)
            .bind(flags.show_email)
            .bind(flags.show_delivery_count)
            .fetch_optional(db)
            .await
            .context("update privacy")?;
        Ok(user)
    }

    pub async fn list_pending_verifications(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE verification_status = 'PENDING' ORDER BY created_at"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(db)
            .await
            .context("list pending verifications")?;
        Ok(users)
    }

    /// Stores document keys and moves the user to PENDING.
    pub async fn submit_verification(
        db: &PgPool,
        id: Uuid,
        docs: &SubmitVerificationRequest,
    ) -> anyhow::Result<VerificationUpdate> {
        let mut tx = db.begin().await?;
        let Some(current) = lock_status(&mut tx, id).await? else {
            return Ok(VerificationUpdate::Missing);
        };
        let next = match on_submit(current) {
            Ok(next) => next,
            Err(e) => return Ok(VerificationUpdate::Refused(e)),
        };

        let sql = format!(
            r#"
            UPDATE users
               SET verification_status = $2, id_type = $3, id_front_key = $4,
                   id_back_key = $5, selfie_key = $6
             WHERE id = $1
         RETURNING {USER_COLUMNS}
            "#
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(next)
            .bind(&docs.id_type)
            .bind(&docs.id_front_key)
            .bind(&docs.id_back_key)
            .bind(&docs.selfie_key)
            .fetch_one(&mut *tx)
            .await
            .context("submit verification")?;
        tx.commit().await?;
        Ok(VerificationUpdate::Done(user))
    }

    pub async fn review_verification(
        db: &PgPool,
        id: Uuid,
        approve: bool,
    ) -> anyhow::Result<VerificationUpdate> {
        let mut tx = db.begin().await?;
        let Some(current) = lock_status(&mut tx, id).await? else {
            return Ok(VerificationUpdate::Missing);
        };
        let next = match on_review(current, approve) {
            Ok(next) => next,
            Err(e) => return Ok(VerificationUpdate::Refused(e)),
        };

        let sql = format!(
            "UPDATE users SET verification_status = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(next)
            .fetch_one(&mut *tx)
            .await
            .context("review verification")?;
        tx.commit().await?;
        Ok(VerificationUpdate::Done(user))
    }
}

async fn lock_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> anyhow::Result<Option<VerificationStatus>> {
    let status = sqlx::query_scalar::<_, VerificationStatus>(
        r#"SELECT verification_status FROM users WHERE id = $1 FOR UPDATE"#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock user")?;
    Ok(status)
}
