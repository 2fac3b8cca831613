use serde_json::Value;
use sqlx::PgPool;

use crate::error::{Error, Result};
use crate::models::{MediaCard, MovieRecord, PageParams, ScoredCard};

use super::{
    decode_doc, DeleteOutcome, DeleteStatus, SortOrder, UpsertOutcome, UpsertStatus,
};

/// Minimum trigram similarity for fuzzy title search.
const FUZZY_THRESHOLD: f64 = 0.1;

#[derive(Clone)]
pub struct MovieRepository {
    pool: PgPool,
}

impl MovieRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store or update a movie document.
    ///
    /// Existing records get their scalar metadata overwritten and the
    /// incoming quality variants appended (without dedup unless
    /// `merge_by_type` is set).
    pub async fn upsert(&self, record: &MovieRecord, merge_by_type: bool) -> Result<UpsertOutcome> {
        if record.mid == 0 {
            return Err(Error::InvalidInput("Movie ID (mid) is required".to_string()));
        }

        let existing = sqlx::query_as::<_, (Value,)>("SELECT doc FROM movies WHERE mid = $1")
            .bind(record.mid)
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some((doc,)) => {
                let mut stored: MovieRecord = decode_doc(doc)?;
                stored.apply_update(record.clone(), merge_by_type);
                let doc = serde_json::to_value(&stored)?;
                sqlx::query(
                    "UPDATE movies SET title = $2, doc = $3, updated_at = now() WHERE mid = $1",
                )
                .bind(record.mid)
                .bind(&stored.title)
                .bind(&doc)
                .execute(&self.pool)
                .await?;
                Ok(UpsertOutcome {
                    status: UpsertStatus::Updated,
                    id: record.mid,
                })
            }
            None => {
                let doc = serde_json::to_value(record)?;
                sqlx::query("INSERT INTO movies (mid, title, doc) VALUES ($1, $2, $3)")
                    .bind(record.mid)
                    .bind(&record.title)
                    .bind(&doc)
                    .execute(&self.pool)
                    .await?;
                Ok(UpsertOutcome {
                    status: UpsertStatus::Inserted,
                    id: record.mid,
                })
            }
        }
    }

    pub async fn find_by_id(&self, mid: i64) -> Result<Option<MovieRecord>> {
        let row = sqlx::query_as::<_, (Value,)>("SELECT doc FROM movies WHERE mid = $1")
            .bind(mid)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(doc,)| decode_doc(doc)).transpose()
    }

    /// Newest records with their internal ids (for id-ordered merges
    /// across collections).
    pub async fn latest_with_ids(&self, limit: i64) -> Result<Vec<(i64, MovieRecord)>> {
        let rows = sqlx::query_as::<_, (i64, Value)>(
            "SELECT id, doc FROM movies ORDER BY id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(id, doc)| Ok((id, decode_doc(doc)?)))
            .collect()
    }

    /// Card page plus the total collection count.
    pub async fn find_paginated(
        &self,
        params: PageParams,
        sort: SortOrder,
    ) -> Result<(Vec<MediaCard>, u64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await?;

        let query = format!(
            "SELECT doc FROM movies {} OFFSET $1 LIMIT $2",
            sort.sql_clause()
        );
        let rows = sqlx::query_as::<_, (Value,)>(&query)
            .bind(params.offset())
            .bind(params.limit())
            .fetch_all(&self.pool)
            .await?;

        let cards = rows
            .into_iter()
            .map(|(doc,)| Ok(decode_doc::<MovieRecord>(doc)?.card()))
            .collect::<Result<Vec<_>>>()?;
        Ok((cards, total as u64))
    }

    /// Case-insensitive substring title search.
    pub async fn search_by_title(&self, title_query: &str) -> Result<Vec<MediaCard>> {
        let rows = sqlx::query_as::<_, (Value,)>(
            "SELECT doc FROM movies WHERE title ILIKE '%' || $1 || '%' ORDER BY id DESC",
        )
        .bind(title_query)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(doc,)| Ok(decode_doc::<MovieRecord>(doc)?.card()))
            .collect()
    }

    /// Trigram-fuzzy title search returning scored cards, best first.
    pub async fn search_fuzzy(&self, title_query: &str, limit: i64) -> Result<Vec<ScoredCard>> {
        let rows = sqlx::query_as::<_, (Value, f64)>(
            "SELECT doc, similarity(title, $1)::double precision AS score \
             FROM movies \
             WHERE similarity(title, $1) > $2 \
             ORDER BY score DESC \
             LIMIT $3",
        )
        .bind(title_query)
        .bind(FUZZY_THRESHOLD)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(doc, score)| {
                Ok(ScoredCard {
                    card: decode_doc::<MovieRecord>(doc)?.card(),
                    score,
                })
            })
            .collect()
    }

    /// Records matching at least one of the requested genres,
    /// most popular first.
    pub async fn find_similar(&self, genres: &[String], limit: i64) -> Result<Vec<MediaCard>> {
        let first = genres.first().cloned().unwrap_or_default();
        let second = genres.get(1).cloned().unwrap_or_default();

        let rows = sqlx::query_as::<_, (Value,)>(
            "SELECT doc FROM movies \
             WHERE EXISTS (SELECT 1 FROM jsonb_array_elements_text(COALESCE(doc->'genres', '[]'::jsonb)) AS g \
                           WHERE g ILIKE '%' || $1 || '%') \
                OR ($2 <> '' AND EXISTS (SELECT 1 FROM jsonb_array_elements_text(COALESCE(doc->'genres', '[]'::jsonb)) AS g \
                                         WHERE g ILIKE '%' || $2 || '%')) \
             ORDER BY (doc->>'popularity')::double precision DESC NULLS LAST \
             LIMIT $3",
        )
        .bind(first)
        .bind(second)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(doc,)| Ok(decode_doc::<MovieRecord>(doc)?.card()))
            .collect()
    }

    pub async fn delete(&self, mid: i64) -> Result<DeleteOutcome> {
        let result = sqlx::query("DELETE FROM movies WHERE mid = $1")
            .bind(mid)
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
