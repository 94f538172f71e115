//! Error types for the PostgreSQL subscription store.

use subsync_billing::BillingError;

/// Errors specific to the PostgreSQL backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::error::Error),

    /// Schema bootstrap error.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for BillingError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) => BillingError::store(e.to_string()),
            PostgresError::Migration(e) => BillingError::store(format!("Migration error: {e}")),
            PostgresError::Config { message } => BillingError::invalid_config(message),
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
