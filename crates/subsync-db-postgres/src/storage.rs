//! `SubscriptionStore` implementation backed by PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_postgres::PgPool;
use subsync_billing::{BillingError, Subscription, SubscriptionStatus, SubscriptionStore};
use time::OffsetDateTime;
use tracing::{debug, instrument};

use crate::config::PostgresConfig;
use crate::error::{PostgresError, Result};
use crate::pool::{create_pool, ping};
use crate::schema::ensure_schema;

type SubscriptionRow = (
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

const SELECT_COLUMNS: &str =
    "SELECT id, external_id, owner_id, status, plan, created_at, updated_at FROM subscriptions";

/// PostgreSQL subscription store.
#[derive(Debug, Clone)]
pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    /// Wraps an existing pool. The schema is assumed to exist.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the pool and, if configured, bootstraps the schema.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        if config.run_migrations {
            ensure_schema(&pool).await?;
        }
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Checks that the database answers queries.
    pub async fn health_check(&self) -> Result<()> {
        ping(&self.pool).await
    }

    fn time_to_chrono(t: OffsetDateTime) -> DateTime<Utc> {
        DateTime::from_timestamp(t.unix_timestamp(), t.nanosecond()).unwrap_or_else(Utc::now)
    }

    fn chrono_to_time(t: DateTime<Utc>) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(t.timestamp_micros()) * 1_000)
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    fn from_row(row: SubscriptionRow) -> std::result::Result<Subscription, BillingError> {
        let (id, external_id, owner_id, status, plan, created_at, updated_at) = row;
        Ok(Subscription {
            id,
            external_id,
            owner_id,
            status: status.parse()?,
            plan,
            created_at: Self::chrono_to_time(created_at),
            updated_at: Self::chrono_to_time(updated_at),
        })
    }
}

fn db_err(e: sqlx_core::error::Error) -> BillingError {
    PostgresError::from(e).into()
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    #[instrument(skip(self))]
    async fn ping(&self) -> std::result::Result<(), BillingError> {
        self.health_check().await.map_err(BillingError::from)
    }

    #[instrument(skip(self))]
    async fn fetch_pending(&self, owner_id: &str) -> std::result::Result<Vec<Subscription>, BillingError> {
        let rows: Vec<SubscriptionRow> = sqlx_core::query_as::query_as(&format!(
            "{SELECT_COLUMNS} WHERE owner_id = $1 AND status = $2 ORDER BY created_at, id"
        ))
        .bind(owner_id)
        .bind(SubscriptionStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(count = rows.len(), "Fetched pending subscriptions");
        rows.into_iter().map(Self::from_row).collect()
    }

    async fn update_status(
        &self,
        id: &str,
        status: SubscriptionStatus,
    ) -> std::result::Result<bool, BillingError> {
        let result = sqlx_core::query::query(
            "UPDATE subscriptions SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> std::result::Result<bool, BillingError> {
        let result = sqlx_core::query::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert(&self, subscription: &Subscription) -> std::result::Result<(), BillingError> {
        sqlx_core::query::query(
            r#"
            INSERT INTO subscriptions (id, external_id, owner_id, status, plan, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&subscription.id)
        .bind(&subscription.external_id)
        .bind(&subscription.owner_id)
        .bind(subscription.status.as_str())
        .bind(&subscription.plan)
        .bind(Self::time_to_chrono(subscription.created_at))
        .bind(Self::time_to_chrono(subscription.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        debug!(id = %subscription.id, "Inserted subscription");
        Ok(())
    }

    async fn get(&self, id: &str) -> std::result::Result<Option<Subscription>, BillingError> {
        let row: Option<SubscriptionRow> =
            sqlx_core::query_as::query_as(&format!("{SELECT_COLUMNS} WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(Self::from_row).transpose()
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> std::result::Result<Option<Subscription>, BillingError> {
        let row: Option<SubscriptionRow> = sqlx_core::query_as::query_as(&format!(
            "{SELECT_COLUMNS} WHERE external_id = $1 ORDER BY created_at LIMIT 1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Self::from_row).transpose()
    }

    async fn list_pending_owners(&self) -> std::result::Result<Vec<String>, BillingError> {
        let rows: Vec<(String,)> = sqlx_core::query_as::query_as(
            "SELECT DISTINCT owner_id FROM subscriptions WHERE status = $1 ORDER BY owner_id",
        )
        .bind(SubscriptionStatus::Pending.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|(owner,)| owner).collect())
    }
}
