use serde_json::Value;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::UserRecord;

use super::decode_doc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterStatus {
    Registered,
    AlreadyExists,
}

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert-if-absent registration. Returns the stored record, which
    /// for an existing user keeps the original registration date.
    pub async fn register(&self, user: &UserRecord) -> Result<(RegisterStatus, UserRecord)> {
        let existing = sqlx::query_as::<_, (Value,)>("SELECT doc FROM users WHERE user_id = $1")
            .bind(user.user_id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some((doc,)) = existing {
            return Ok((RegisterStatus::AlreadyExists, decode_doc(doc)?));
        }

        let doc = serde_json::to_value(user)?;
        sqlx::query("INSERT INTO users (user_id, doc) VALUES ($1, $2)")
            .bind(user.user_id)
            .bind(&doc)
            .execute(&self.pool)
            .await?;
        Ok((RegisterStatus::Registered, user.clone()))
    }

    pub async fn find_by_id(&self, user_id: i64) -> Result<Option<UserRecord>> {
        let row = sqlx::query_as::<_, (Value,)>("SELECT doc FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(doc,)| decode_doc(doc)).transpose()
    }

    /// Update the user's days-of-access allowance.
    pub async fn update_slimit(&self, user_id: i64, slimit: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET doc = jsonb_set(doc, '{slimit}', to_jsonb($2::bigint)), \
             updated_at = now() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(slimit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_active(&self, user_id: i64, is_active: bool) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET doc = jsonb_set(doc, '{is_active}', to_jsonb($2::boolean)), \
             updated_at = now() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(is_active)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
