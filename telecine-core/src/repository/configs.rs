use serde_json::{json, Value};
use sqlx::PgPool;

use crate::error::Result;
use crate::models::TrendingConfig;

use super::{DeleteOutcome, DeleteStatus, UpsertStatus};

/// Config document key holding the curated trending ids.
const TRENDING_KEY: &str = "trending";

#[derive(Clone)]
pub struct ConfigRepository {
    pool: PgPool,
}

impl ConfigRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        key: &str,
        value: &Value,
        description: Option<&str>,
    ) -> Result<UpsertStatus> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM configs WHERE key = $1)")
                .bind(key)
                .fetch_one(&self.pool)
                .await?;

        if exists {
            sqlx::query(
                "UPDATE configs SET value = $2, description = COALESCE($3, description), \
                 updated_at = now() WHERE key = $1",
            )
            .bind(key)
            .bind(value)
            .bind(description)
            .execute(&self.pool)
            .await?;
            Ok(UpsertStatus::Updated)
        } else {
            sqlx::query("INSERT INTO configs (key, value, description) VALUES ($1, $2, $3)")
                .bind(key)
                .bind(value)
                .bind(description)
                .execute(&self.pool)
                .await?;
            Ok(UpsertStatus::Inserted)
        }
    }

    pub async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query_as::<_, (Value,)>("SELECT value FROM configs WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    pub async fn save_trending(&self, movie_ids: &[i64], show_ids: &[i64]) -> Result<UpsertStatus> {
        let value = json!({ "movie": movie_ids, "show": show_ids });
        self.upsert(
            TRENDING_KEY,
            &value,
            Some("IDs of trending movies and shows"),
        )
        .await
    }

    /// Missing or malformed config degrades to empty lists.
    pub async fn get_trending(&self) -> Result<TrendingConfig> {
        let value = self.get_value(TRENDING_KEY).await?;
        Ok(value
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default())
    }

    pub async fn delete(&self, key: &str) -> Result<DeleteOutcome> {
        let result = sqlx::query("DELETE FROM configs WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        let deleted_count = result.rows_affected();
        Ok(DeleteOutcome {
            status: if deleted_count > 0 {
                DeleteStatus::Success
            } else {
                DeleteStatus::NotFound
            },
            deleted_count,
        })
    }
}
