use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use refresh_core::{
    models::{DataSource, Organization, User},
    traits::{DataSourceRepository, OrganizationRepository, UserRepository},
    RefreshResult,
};

pub struct PostgresDataSourceRepository {
    pool: PgPool,
}

impl PostgresDataSourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataSourceRepository for PostgresDataSourceRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<DataSource>> {
        let row = sqlx::query(
            r#"
            SELECT ds.id, ds.org_id, ds.name, ds.type, ds.options, ds.queue_name,
                   ds.scheduled_queue_name, ds.paused, ds.pause_reason,
                   ARRAY(SELECT dsg.group_id FROM data_source_groups dsg
                         WHERE dsg.data_source_id = ds.id ORDER BY dsg.group_id) AS group_ids
            FROM data_sources ds
            WHERE ds.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(DataSource {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            name: row.try_get("name")?,
            runner_type: row.try_get("type")?,
            options: row
                .try_get::<Option<serde_json::Value>, _>("options")?
                .unwrap_or_default(),
            queue_name: row.try_get("queue_name")?,
            scheduled_queue_name: row.try_get("scheduled_queue_name")?,
            paused: row.try_get("paused")?,
            pause_reason: row.try_get("pause_reason")?,
            group_ids: row.try_get("group_ids")?,
        }))
    }
}

pub struct PostgresOrganizationRepository {
    pool: PgPool,
}

impl PostgresOrganizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationRepository for PostgresOrganizationRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<Organization>> {
        let row = sqlx::query(
            r#"
            SELECT id, name,
                   COALESCE((settings->>'is_disabled')::boolean, false) AS is_disabled,
                   COALESCE((settings->'settings'->>'send_email_on_failed_scheduled_queries')::boolean, false)
                       AS send_failure_emails
            FROM organizations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(Organization {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            is_disabled: row.try_get("is_disabled")?,
            send_failure_emails: row.try_get("send_failure_emails")?,
        }))
    }
}

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: i64) -> RefreshResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, org_id, name, email, disabled_at IS NOT NULL AS is_disabled,
                   COALESCE(groups, '{}'::bigint[]) AS group_ids
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(User {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            is_disabled: row.try_get("is_disabled")?,
            group_ids: row.try_get("group_ids")?,
        }))
    }
}
