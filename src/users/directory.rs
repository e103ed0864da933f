use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::persistence::StoreError;
use crate::users::repo_types::{Actor, UserRole, VerificationStatus};

/// Role and verification lookups for acting users.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn actor(&self, user_id: Uuid) -> Result<Option<Actor>, StoreError>;
    async fn verification_status(&self, user_id: Uuid) -> Result<VerificationStatus, StoreError>;
}

#[derive(Clone)]
pub struct PgDirectory {
    db: PgPool,
}

impl PgDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityDirectory for PgDirectory {
    async fn actor(&self, user_id: Uuid) -> Result<Option<Actor>, StoreError> {
        let row = sqlx::query_as::<_, (Uuid, UserRole)>(r#"SELECT id, role FROM users WHERE id = $1"#)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|(id, role)| Actor { id, role }))
    }

    async fn verification_status(&self, user_id: Uuid) -> Result<VerificationStatus, StoreError> {
        sqlx::query_scalar::<_, VerificationStatus>(
            r#"SELECT verification_status FROM users WHERE id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::MissingUser(user_id))
    }
}
