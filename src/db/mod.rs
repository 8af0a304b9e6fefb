#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

mod credential_ops;
mod mappers;
mod message_ops;
mod state_ops;
mod table_ops;
pub mod tables;
mod task_ops;


use crate::canonical_schema::CANONICAL_SCHEMA_SQL;
use crate::error::{Result, SessionError};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub use tables::{ColumnFormat, ColumnKind, ColumnSpec, TableSpec, AUXILIARY_TABLES};

#[derive(Clone, Debug)]
pub struct SessionDb {
    pool: SqlitePool,
}

impl SessionDb {
    /// Opens (creating if needed) the database file named by `database_url`.
    ///
    /// # Errors
    /// Returns an error if the URL is not a SQLite URL or the connection fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| SessionError::ConfigError(format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let filename = options.clone().get_filename();
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(resolve_pool_max_connections())
            .connect_with(options)
            .await
            .map_err(|e| {
                SessionError::DatabaseError(format!("Failed to connect to database: {e}"))
            })?;

        info!(database_url, "Connected to session database");
        Ok(Self { pool })
    }

    /// Private in-memory store with the schema applied. The pool holds a single
    /// connection that never expires, since every SQLite memory connection is
    /// its own database.
    ///
    /// # Errors
    /// Returns an error if the connection or schema setup fails.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                SessionError::DatabaseError(format!("Failed to open in-memory database: {e}"))
            })?;
        let db = Self { pool };
        db.initialize_schema().await?;
        Ok(db)
    }

    const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn initialize_schema(&self) -> Result<()> {
        sqlx::raw_sql(CANONICAL_SCHEMA_SQL)
            .execute(self.pool())
            .await
            .map(|_result| ())
            .map_err(|e| SessionError::DatabaseError(format!("Failed to initialize schema: {e}")))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn resolve_pool_max_connections() -> u32 {
    resolve_pool_max_connections_from(|key| std::env::var(key).ok())
}

fn resolve_pool_max_connections_from<F>(env_lookup: F) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    env_lookup("IDEAFORGE_DB_MAX_CONNECTIONS")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(8)
}

#[cfg(test)]
mod pool_tests {
    use super::resolve_pool_max_connections_from;

    #[test]
    fn pool_size_defaults_when_unset_or_invalid() {
        assert_eq!(resolve_pool_max_connections_from(|_| None), 8);
        assert_eq!(
            resolve_pool_max_connections_from(|_| Some("zero".to_string())),
            8
        );
        assert_eq!(
            resolve_pool_max_connections_from(|_| Some("0".to_string())),
            8
        );
    }

    #[test]
    fn pool_size_honors_positive_override() {
        assert_eq!(
            resolve_pool_max_connections_from(|_| Some("3".to_string())),
            3
        );
    }
}
