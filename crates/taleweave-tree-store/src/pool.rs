//! Connection pool setup and migrations.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};

use taleweave_core::error::DomainError;

/// Opens a pooled SQLite connection with WAL journaling and foreign
/// keys enforced.
///
/// # Errors
///
/// Returns [`DomainError::Infrastructure`] on an invalid URL or a
/// connection failure.
pub async fn connect(database_url: &str) -> Result<SqlitePool, DomainError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| DomainError::Infrastructure(format!("invalid database URL: {e}")))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    SqlitePool::connect_with(options)
        .await
        .map_err(|e| DomainError::Infrastructure(format!("database connection failed: {e}")))
}

/// Applies pending migrations from the workspace `migrations/` directory.
///
/// # Errors
///
/// Returns [`DomainError::Infrastructure`] if a migration fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DomainError> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| DomainError::Infrastructure(format!("migration failed: {e}")))
}
