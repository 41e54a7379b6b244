use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use refresh_core::{
    models::{NewQueryResult, QueryResult, StoredResult},
    traits::ResultStore,
    RefreshResult,
};

const RESULT_COLUMNS: &str =
    "id, org_id, data_source_id, query_hash, query, data, runtime, retrieved_at";

pub struct PostgresResultStore {
    pool: PgPool,
}

impl PostgresResultStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_result(row: &sqlx::postgres::PgRow) -> RefreshResult<QueryResult> {
        Ok(QueryResult {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            data_source_id: row.try_get("data_source_id")?,
            query_hash: row.try_get("query_hash")?,
            query_text: row.try_get("query")?,
            data: row.try_get("data")?,
            runtime: row.try_get("runtime")?,
            retrieved_at: row.try_get("retrieved_at")?,
        })
    }
}

#[async_trait]
impl ResultStore for PostgresResultStore {
    #[instrument(skip(self, result), fields(
        data_source_id = result.data_source_id,
        query_hash = %result.query_hash,
    ))]
    async fn store_result(
        &self,
        result: NewQueryResult,
        reset_failures_for: Option<i64>,
    ) -> RefreshResult<StoredResult> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO query_results (org_id, data_source_id, query_hash, query, data, runtime, retrieved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(result.org_id)
        .bind(result.data_source_id)
        .bind(&result.query_hash)
        .bind(&result.query_text)
        .bind(&result.data)
        .bind(result.runtime)
        .bind(result.retrieved_at)
        .fetch_one(&mut *tx)
        .await?;
        let result_id: i64 = row.try_get("id")?;

        if let Some(query_id) = reset_failures_for {
            sqlx::query("UPDATE queries SET schedule_failures = 0 WHERE id = $1")
                .bind(query_id)
                .execute(&mut *tx)
                .await?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE queries SET latest_query_data_id = $1
            WHERE query_hash = $2 AND data_source_id = $3
            RETURNING id
            "#,
        )
        .bind(result_id)
        .bind(&result.query_hash)
        .bind(result.data_source_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut updated_query_ids = updated
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<Result<Vec<_>, _>>()?;
        updated_query_ids.sort_unstable();
        debug!("结果 {} 已指向 {} 个查询", result_id, updated_query_ids.len());

        Ok(StoredResult {
            result: result.into_result(result_id),
            updated_query_ids,
        })
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<QueryResult>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM query_results WHERE id = $1",
            RESULT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_result).transpose()
    }

    #[instrument(skip(self))]
    async fn get_latest(
        &self,
        data_source_id: i64,
        query_hash: &str,
        max_age: Option<Duration>,
    ) -> RefreshResult<Option<QueryResult>> {
        let cutoff: Option<DateTime<Utc>> = max_age.map(|age| Utc::now() - age);
        let row = sqlx::query(&format!(
            "SELECT {} FROM query_results \
             WHERE data_source_id = $1 AND query_hash = $2 \
               AND ($3::timestamptz IS NULL OR retrieved_at >= $3) \
             ORDER BY retrieved_at DESC LIMIT 1",
            RESULT_COLUMNS
        ))
        .bind(data_source_id)
        .bind(query_hash)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_result).transpose()
    }

    #[instrument(skip(self))]
    async fn delete_unused(&self, older_than: DateTime<Utc>, limit: i64) -> RefreshResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM query_results WHERE id IN (
                SELECT qr.id FROM query_results qr
                WHERE qr.retrieved_at < $1
                  AND NOT EXISTS (SELECT 1 FROM queries q WHERE q.latest_query_data_id = qr.id)
                ORDER BY qr.id
                LIMIT $2
            )
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
