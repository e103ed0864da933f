use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::persistence::{LifecycleStore, LifecycleTx, StoreError};
use crate::shipments::repo_types::{NewShipment, Shipment};
use crate::shipments::status::ItemStatus;
use crate::subscriptions::repo_types::SubscriptionTransaction;
use crate::users::repo_types::UserRole;

const SHIPMENT_COLUMNS: &str = r#"
    id, sender_id, partner_id, category, description, pickup_country, dest_country,
    address, receiver_name, receiver_phone, weight, fee, notes, status, created_at,
    picked_at, available_from, available_until, images
"#;

const SUBSCRIPTION_COLUMNS: &str = r#"
    id, user_id, plan_id, plan_name, amount, payment_method, status, remaining_usage,
    is_active, end_date, transaction_reference, created_at
"#;

/// PostgreSQL-backed lifecycle store. Shipment reads lock the row until the
/// transaction ends, which serializes concurrent operations per shipment.
#[derive(Clone)]
pub struct PgLifecycleStore {
    db: PgPool,
}

impl PgLifecycleStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LifecycleStore for PgLifecycleStore {
    async fn begin(&self) -> Result<Box<dyn LifecycleTx>, StoreError> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgLifecycleTx { tx }))
    }
}

pub struct PgLifecycleTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LifecycleTx for PgLifecycleTx {
    async fn get_shipment(&mut self, id: Uuid) -> Result<Option<Shipment>, StoreError> {
        let sql = format!("SELECT {SHIPMENT_COLUMNS} FROM shipment_items WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, Shipment>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn insert_shipment(
        &mut self,
        new: NewShipment,
        now: OffsetDateTime,
    ) -> Result<Shipment, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO shipment_items (
                sender_id, category, description, pickup_country, dest_country, address,
                receiver_name, receiver_phone, weight, fee, notes, status, created_at,
                available_from, available_until, images
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'POSTED', $12, $13, $14, $15)
            RETURNING {SHIPMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Shipment>(&sql)
            .bind(new.sender_id)
            .bind(new.category)
            .bind(new.description)
            .bind(new.pickup_country)
            .bind(new.dest_country)
            .bind(new.address)
            .bind(new.receiver_name)
            .bind(new.receiver_phone)
            .bind(new.weight)
            .bind(new.fee)
            .bind(new.notes)
            .bind(now)
            .bind(new.available_from)
            .bind(new.available_until)
            .bind(new.images)
            .fetch_one(&mut *self.tx)
            .await?;

        sqlx::query(
            r#"UPDATE users SET items_count_this_month = items_count_this_month + 1 WHERE id = $1"#,
        )
        .bind(row.sender_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(row)
    }

    async fn compare_and_swap_status(
        &mut self,
        id: Uuid,
        expected: ItemStatus,
        next: ItemStatus,
        partner_id: Option<Uuid>,
        now: OffsetDateTime,
    ) -> Result<Option<Shipment>, StoreError> {
        let sql = format!(
            r#"
            UPDATE shipment_items
               SET status = $3,
                   partner_id = $4,
                   picked_at = CASE
                       WHEN $3 = 'POSTED'::item_status THEN NULL
                       WHEN $6 THEN COALESCE(picked_at, $5)
                       ELSE picked_at
                   END
             WHERE id = $1 AND status = $2
         RETURNING {SHIPMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Shipment>(&sql)
            .bind(id)
            .bind(expected)
            .bind(next)
            .bind(partner_id)
            .bind(now)
            .bind(next.is_picked_up())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn lock_user(&mut self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, Uuid>(r#"SELECT id FROM users WHERE id = $1 FOR UPDATE"#)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .ok_or(StoreError::MissingUser(user_id))?;
        Ok(())
    }

    async fn get_active_subscription(
        &mut self,
        user_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<SubscriptionTransaction>, StoreError> {
        let sql = format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
              FROM subscription_transactions
             WHERE user_id = $1
               AND is_active
               AND remaining_usage > 0
               AND (end_date IS NULL OR end_date > $2)
             ORDER BY created_at DESC
             LIMIT 1
               FOR UPDATE
            "#
        );
        let row = sqlx::query_as::<_, SubscriptionTransaction>(&sql)
            .bind(user_id)
            .bind(now)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn decrement_quota(
        &mut self,
        subscription_id: Uuid,
        amount: i32,
    ) -> Result<bool, StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE subscription_transactions
               SET remaining_usage = remaining_usage - $2
             WHERE id = $1 AND is_active AND remaining_usage >= $2
            "#,
        )
        .bind(subscription_id)
        .bind(amount)
        .execute(&mut *self.tx)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn record_delivery(&mut self, partner_id: Uuid, fee: f64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
               SET completed_deliveries = completed_deliveries + 1,
                   earnings = earnings + $2
             WHERE id = $1
            "#,
        )
        .bind(partner_id)
        .bind(fee)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

// ---- Queries ----

/// Open marketplace: posted shipments, newest first, optional route filters.
pub async fn list_marketplace(
    db: &PgPool,
    pickup_country: Option<&str>,
    dest_country: Option<&str>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Shipment>> {
    let sql = format!(
        r#"
        SELECT {SHIPMENT_COLUMNS}
          FROM shipment_items
         WHERE status = 'POSTED'
           AND ($1::text IS NULL OR pickup_country = $1)
           AND ($2::text IS NULL OR dest_country = $2)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4
        "#
    );
    let rows = sqlx::query_as::<_, Shipment>(&sql)
        .bind(pickup_country)
        .bind(dest_country)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
    Ok(rows)
}

/// Shipments a user sent (senders) or carries (pickers).
pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    role: UserRole,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<Shipment>> {
    let owner_column = match role {
        UserRole::Picker => "partner_id",
        UserRole::Sender | UserRole::Admin => "sender_id",
    };
    let sql = format!(
        r#"
        SELECT {SHIPMENT_COLUMNS}
          FROM shipment_items
         WHERE {owner_column} = $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3
        "#
    );
    let rows = sqlx::query_as::<_, Shipment>(&sql)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
    Ok(rows)
}
