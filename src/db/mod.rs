//! Data store abstraction layer for db-ask.
//!
//! Provides trait-based interfaces for the two things the pipeline needs from
//! a relational store: structural introspection and read-only statement
//! execution. Backends are interchangeable behind `Arc<dyn DataStore>`.

mod catalog;
mod mock;
mod postgres;
mod schema;
mod sqlite;
mod types;

pub use catalog::SchemaCatalog;
pub use mock::{MockSchemaSource, MockStore};
pub use postgres::{readonly_setup_script, PostgresStore};
pub use schema::{ColumnDescriptor, SchemaSnapshot};
pub use sqlite::SqliteStore;
pub use types::{Row, Value};

use crate::config::ConnectionConfig;
use crate::error::{AskError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Supported store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" | "sqlite3" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the default port for this backend.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Sqlite => 0,
        }
    }

    /// Returns the URL scheme for this backend.
    pub fn url_scheme(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the SQL dialect spoken by this backend.
    pub fn dialect(&self) -> SqlDialect {
        match self {
            Self::Postgres => SqlDialect::Postgres,
            Self::Sqlite => SqlDialect::Sqlite,
        }
    }
}

/// SQL dialect of a store, as far as prompt wording and row limiting care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    Postgres,
    Sqlite,
}

impl SqlDialect {
    /// Human-readable dialect name used in model instructions.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Returns the clause that limits a statement to `n` rows.
    pub fn limit_clause(&self, n: usize) -> String {
        match self {
            Self::Postgres | Self::Sqlite => format!("LIMIT {n}"),
        }
    }

    /// Identifier quoting advice for model instructions.
    pub fn quoting_hint(&self) -> &'static str {
        match self {
            Self::Postgres => "Quote identifiers that contain upper-case letters or spaces with double quotes.",
            Self::Sqlite => "Identifiers may be quoted with double quotes or square brackets.",
        }
    }
}

/// Creates a data store for the given configuration.
///
/// This is the central factory function for store connections.
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn DataStore>> {
    match config.backend {
        DatabaseBackend::Postgres => {
            let store = PostgresStore::connect(config).await?;
            Ok(Arc::new(store))
        }
        DatabaseBackend::Sqlite => {
            let store = SqliteStore::connect(config).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Structural introspection over one scoped connection.
///
/// A source owns the connection it reads through; dropping it returns the
/// connection to the pool.
#[async_trait]
pub trait SchemaSource: Send {
    /// Lists base tables (no views, no system tables) in table-name order.
    async fn list_base_tables(&mut self) -> Result<Vec<String>>;

    /// Lists a table's columns in ordinal order.
    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>>;
}

/// Read-only statement execution against a pooled store.
///
/// All methods take `&self`; the pool is shared by concurrent requests.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Dialect of the underlying store.
    fn dialect(&self) -> SqlDialect;

    /// Checks out a connection for schema introspection.
    async fn schema_source(&self) -> Result<Box<dyn SchemaSource>>;

    /// Runs one statement and returns at most `max_rows` rows.
    ///
    /// Rows are streamed; the statement is abandoned once `max_rows` have
    /// been read.
    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> Result<Vec<Row>>;

    /// Runs a statement returning a single integer.
    async fn fetch_count(&self, sql: &str) -> Result<i64>;

    /// Round-trips a trivial statement.
    async fn ping(&self) -> Result<()>;

    /// Closes the pool.
    async fn close(&self) -> Result<()>;
}

/// Maps a sqlx error raised while running a statement.
///
/// Errors reported by the store itself (syntax, unknown column, permission)
/// become query errors carrying the store's message; transport and pool
/// failures become connection errors.
pub(crate) fn map_statement_error(error: sqlx::Error) -> AskError {
    match &error {
        sqlx::Error::Database(_) => AskError::query(format_database_error(&error)),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => AskError::connection(error.to_string()),
        _ => AskError::query(error.to_string()),
    }
}

/// Formats a store-reported error with PostgreSQL detail and hint when present.
fn format_database_error(error: &sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
