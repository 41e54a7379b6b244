use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use refresh_core::{models::Query, traits::QueryRepository, RefreshError, RefreshResult};

use crate::database::mapping::MappingHelpers;

const QUERY_COLUMNS: &str = "id, org_id, user_id, name, query, query_hash, data_source_id, \
     schedule, schedule_failures, latest_query_data_id, options, is_archived, updated_at";

pub struct PostgresQueryRepository {
    pool: PgPool,
}

impl PostgresQueryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_query(row: &sqlx::postgres::PgRow) -> RefreshResult<Query> {
        let id: i64 = row.try_get("id")?;
        Ok(Query {
            id,
            org_id: row.try_get("org_id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            query_text: row.try_get("query")?,
            query_hash: row.try_get("query_hash")?,
            data_source_id: row.try_get("data_source_id")?,
            schedule: MappingHelpers::parse_schedule(id, row.try_get("schedule")?),
            schedule_failures: row.try_get("schedule_failures")?,
            latest_query_data_id: row.try_get("latest_query_data_id")?,
            options: MappingHelpers::parse_options(id, row.try_get("options")?),
            is_archived: row.try_get("is_archived")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl QueryRepository for PostgresQueryRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<Query>> {
        let row = sqlx::query(&format!("SELECT {} FROM queries WHERE id = $1", QUERY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_query).transpose()
    }

    #[instrument(skip(self))]
    async fn get_scheduled(&self) -> RefreshResult<Vec<Query>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM queries \
             WHERE schedule IS NOT NULL AND schedule::text <> 'null' AND NOT is_archived \
             ORDER BY id",
            QUERY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        debug!("读取到 {} 个定时查询", rows.len());
        rows.iter().map(Self::row_to_query).collect()
    }

    #[instrument(skip(self))]
    async fn get_past_scheduled(&self, today: NaiveDate) -> RefreshResult<Vec<Query>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM queries \
             WHERE schedule IS NOT NULL \
               AND schedule->>'until' IS NOT NULL \
               AND (schedule->>'until')::date < $1 \
             ORDER BY id",
            QUERY_COLUMNS
        ))
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_query).collect()
    }

    #[instrument(skip(self))]
    async fn clear_schedule(&self, id: i64) -> RefreshResult<()> {
        sqlx::query("UPDATE queries SET schedule = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn disable_schedule(&self, id: i64) -> RefreshResult<()> {
        sqlx::query(
            "UPDATE queries SET schedule = jsonb_set(schedule, '{disabled}', 'true'::jsonb) \
             WHERE id = $1 AND schedule IS NOT NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment_schedule_failures(&self, id: i64) -> RefreshResult<i32> {
        let row = sqlx::query(
            "UPDATE queries SET schedule_failures = schedule_failures + 1 \
             WHERE id = $1 RETURNING schedule_failures",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.try_get("schedule_failures")?),
            None => Err(RefreshError::not_found("查询", id)),
        }
    }
}
