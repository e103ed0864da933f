use anyhow::Context;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Message, MessageThread, ThreadSummary};
use super::services::ordered_pair;

const THREAD_COLUMNS: &str =
    "id, shipment_id, participant1_id, participant2_id, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, thread_id, shipment_id, sender_id, receiver_id, text, is_read, created_at";

/// Finds or creates the thread between `a` and `b` for `shipment_id`.
/// Returns the thread and whether it was created.
pub async fn open_thread(
    db: &PgPool,
    a: Uuid,
    b: Uuid,
    shipment_id: Option<Uuid>,
) -> anyhow::Result<(MessageThread, bool)> {
    let (p1, p2) = ordered_pair(a, b);

    let insert = format!(
        r#"
        INSERT INTO message_threads (shipment_id, participant1_id, participant2_id)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        RETURNING {THREAD_COLUMNS}
        "#
    );
    let created = sqlx::query_as::<_, MessageThread>(&insert)
        .bind(shipment_id)
        .bind(p1)
        .bind(p2)
        .fetch_optional(db)
        .await
        .context("insert message thread")?;
    if let Some(thread) = created {
        return Ok((thread, true));
    }

    let select = format!(
        r#"
        SELECT {THREAD_COLUMNS}
          FROM message_threads
         WHERE participant1_id = $1 AND participant2_id = $2
           AND shipment_id IS NOT DISTINCT FROM $3
        "#
    );
    let existing = sqlx::query_as::<_, MessageThread>(&select)
        .bind(p1)
        .bind(p2)
        .bind(shipment_id)
        .fetch_one(db)
        .await
        .context("load existing message thread")?;
    Ok((existing, false))
}

pub async fn find_thread(db: &PgPool, id: Uuid) -> anyhow::Result<Option<MessageThread>> {
    let sql = format!("SELECT {THREAD_COLUMNS} FROM message_threads WHERE id = $1");
    let row = sqlx::query_as::<_, MessageThread>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
        .context("find message thread")?;
    Ok(row)
}

pub async fn shipment_sender(db: &PgPool, shipment_id: Uuid) -> anyhow::Result<Option<Uuid>> {
    let sender = sqlx::query_scalar::<_, Uuid>(r#"SELECT sender_id FROM shipment_items WHERE id = $1"#)
        .bind(shipment_id)
        .fetch_optional(db)
        .await
        .context("load shipment sender")?;
    Ok(sender)
}

/// The user's threads, most recently active first.
pub async fn list_threads(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<ThreadSummary>> {
    let rows = sqlx::query_as::<_, ThreadSummary>(
        r#"
        SELECT t.id, t.shipment_id, t.participant1_id, t.participant2_id,
               (SELECT m.text FROM messages m
                 WHERE m.thread_id = t.id
                 ORDER BY m.created_at DESC
                 LIMIT 1) AS last_message,
               (SELECT COUNT(*) FROM messages m
                 WHERE m.thread_id = t.id AND m.receiver_id = $1 AND NOT m.is_read) AS unread_count,
               t.updated_at
          FROM message_threads t
         WHERE t.participant1_id = $1 OR t.participant2_id = $1
         ORDER BY t.updated_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list message threads")?;
    Ok(rows)
}

/// Messages of a thread, oldest first.
pub async fn list_messages(
    db: &PgPool,
    thread_id: Uuid,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Message>> {
    let sql = format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
          FROM messages
         WHERE thread_id = $1
         ORDER BY created_at
         LIMIT $2 OFFSET $3
        "#
    );
    let rows = sqlx::query_as::<_, Message>(&sql)
        .bind(thread_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await
        .context("list messages")?;
    Ok(rows)
}

/// Appends a message and bumps the thread's activity time.
pub async fn insert_message(
    db: &PgPool,
    thread: &MessageThread,
    sender_id: Uuid,
    receiver_id: Uuid,
    text: &str,
) -> anyhow::Result<Message> {
    let now = OffsetDateTime::now_utc();
    let mut tx = db.begin().await?;

    let sql = format!(
        r#"
        INSERT INTO messages (thread_id, shipment_id, sender_id, receiver_id, text, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {MESSAGE_COLUMNS}
        "#
    );
    let message = sqlx::query_as::<_, Message>(&sql)
        .bind(thread.id)
        .bind(thread.shipment_id)
        .bind(sender_id)
        .bind(receiver_id)
        .bind(text)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .context("insert message")?;

    sqlx::query(r#"UPDATE message_threads SET updated_at = $2 WHERE id = $1"#)
        .bind(thread.id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("touch message thread")?;

    tx.commit().await?;
    Ok(message)
}

/// Marks the messages addressed to `user_id` in a thread as read.
pub async fn mark_thread_read(db: &PgPool, thread_id: Uuid, user_id: Uuid) -> anyhow::Result<u64> {
    let done = sqlx::query(
        r#"UPDATE messages SET is_read = TRUE WHERE thread_id = $1 AND receiver_id = $2 AND NOT is_read"#,
    )
    .bind(thread_id)
    .bind(user_id)
    .execute(db)
    .await
    .context("mark thread read")?;
    Ok(done.rows_affected())
}
