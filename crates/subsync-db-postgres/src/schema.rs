//! Schema bootstrap for the subscriptions table.

use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::error::{PostgresError, Result};

/// Statements run in order by [`ensure_schema`]. Each is idempotent.
const SCHEMA_STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS subscriptions (
        id TEXT PRIMARY KEY,
        external_id TEXT,
        owner_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        plan TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_subscriptions_owner_status ON subscriptions (owner_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_subscriptions_external_id ON subscriptions (external_id) WHERE external_id IS NOT NULL",
];

/// Creates the subscriptions table and its indexes if they are missing.
#[instrument(skip(pool))]
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx_core::query::query(statement)
            .execute(pool)
            .await
            .map_err(|e| PostgresError::Migration(e.to_string()))?;
    }
    debug!(statements = SCHEMA_STATEMENTS.len(), "Schema statements applied");
    info!("Subscriptions schema is up to date");
    Ok(())
}
