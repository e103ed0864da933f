use anyhow::Context;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::notifier::Rendered;
use super::services::BroadcastTarget;

/// Notification record in the database.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub link: Option<String>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, title, message, kind, link, is_read, created_at";

pub async fn insert(db: &PgPool, user_id: Uuid, r: &Rendered) -> anyhow::Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO notifications (user_id, title, message, kind, link)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(&r.title)
    .bind(&r.message)
    .bind(r.kind)
    .bind(&r.link)
    .fetch_one(db)
    .await
    .context("insert notification")?;
    Ok(id)
}

pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    unread_only: bool,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Notification>> {
    let sql = format!(
        r#"
        SELECT {NOTIFICATION_COLUMNS}
          FROM notifications
         WHERE user_id = $1 AND (NOT $2 OR NOT is_read)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4
        "#
    );
    let rows = sqlx::query_as::<_, Notification>(&sql)
        .bind(user_id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list notifications")?;
    Ok(rows)
}

/// Marks one of the user's notifications read. `false` if it is not theirs.
pub async fn mark_read(db: &PgPool, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
    let done = sqlx::query(r#"UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2"#)
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await
        .context("mark notification read")?;
    Ok(done.rows_affected() == 1)
}

pub async fn mark_all_read(db: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
    let done = sqlx::query(r#"UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read"#)
        .bind(user_id)
        .execute(db)
        .await
        .context("mark all notifications read")?;
    Ok(done.rows_affected())
}

/// Inserts `r` for every user the target selects. Returns how many.
pub async fn broadcast(db: &PgPool, r: &Rendered, target: &BroadcastTarget) -> anyhow::Result<u64> {
    let query = match target {
        BroadcastTarget::All => sqlx::query_scalar::<_, i64>(
            r#"
            WITH sent AS (
                INSERT INTO notifications (user_id, title, message, kind, link)
                SELECT id, $1, $2, $3, $4 FROM users
                RETURNING 1
            )
            SELECT COUNT(*) FROM sent
            "#,
        ),
        BroadcastTarget::Role { .. } => sqlx::query_scalar::<_, i64>(
            r#"
            WITH sent AS (
                INSERT INTO notifications (user_id, title, message, kind, link)
                SELECT id, $1, $2, $3, $4 FROM users WHERE role::text = ANY($5)
                RETURNING 1
            )
            SELECT COUNT(*) FROM sent
            "#,
        ),
        BroadcastTarget::Users { .. } => sqlx::query_scalar::<_, i64>(
            r#"
            WITH sent AS (
                INSERT INTO notifications (user_id, title, message, kind, link)
                SELECT id, $1, $2, $3, $4 FROM users WHERE id = ANY($5)
                RETURNING 1
            )
            SELECT COUNT(*) FROM sent
            "#,
        ),
        BroadcastTarget::LocationHistory { .. } => sqlx::query_scalar::<_, i64>(
            r#"
            WITH sent AS (
                INSERT INTO notifications (user_id, title, message, kind, link)
                SELECT DISTINCT partner_id, $1, $2, $3, $4
                  FROM shipment_items
                 WHERE partner_id IS NOT NULL AND (pickup_country = $5 OR dest_country = $5)
                RETURNING 1
            )
            SELECT COUNT(*) FROM sent
            "#,
        ),
    };
    let query = query.bind(&r.title).bind(&r.message).bind(r.kind).bind(&r.link);
    let query = match target {
        BroadcastTarget::All => query,
        BroadcastTarget::Role { roles } => {
            query.bind(roles.iter().map(|r| r.as_str().to_string()).collect::<Vec<_>>())
        }
        BroadcastTarget::Users { user_ids } => query.bind(user_ids.clone()),
        BroadcastTarget::LocationHistory { location } => query.bind(location.trim().to_string()),
    };
    let sent = query.fetch_one(db).await.context("broadcast notification")?;
    Ok(sent.max(0) as u64)
}
