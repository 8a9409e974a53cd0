//! SQLite data store.
//!
//! Database files are always opened read-only.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use regex::Regex;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, Sqlite, TypeInfo, ValueRef};
use tracing::debug;

use super::{
    map_statement_error, ColumnDescriptor, DataStore, Row, SchemaSource, SqlDialect, Value,
};
use crate::config::ConnectionConfig;
use crate::error::{AskError, Result};

/// SQLite store backed by a read-only connection pool.
#[derive(Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Creates a store from an existing pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens the configured database file read-only.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let path = config
            .path
            .as_deref()
            .ok_or_else(|| AskError::config("SQLite connection requires a file path"))?;

        if !path.exists() {
            return Err(AskError::connection(format!(
                "Database file '{}' does not exist.",
                path.display()
            )));
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                AskError::connection(format!("Failed to open {}: {e}", path.display()))
            })?;

        debug!("Opened {}", config.display_string());
        Ok(Self::from_pool(pool))
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn schema_source(&self) -> Result<Box<dyn SchemaSource>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AskError::connection(format!("Failed to acquire connection: {e}")))?;
        Ok(Box::new(SqliteSchemaSource { conn }))
    }

    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> Result<Vec<Row>> {
        let mut stream = sqlx::query(sql).fetch(&self.pool);
        let mut rows = Vec::new();

        while rows.len() < max_rows {
            match stream.try_next().await.map_err(map_statement_error)? {
                Some(row) => rows.push(convert_row(&row)),
                None => break,
            }
        }

        Ok(rows)
    }

    async fn fetch_count(&self, sql: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(map_statement_error)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AskError::connection(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Reads `sqlite_master` and `pragma_table_info` over one pooled connection.
struct SqliteSchemaSource {
    conn: PoolConnection<Sqlite>,
}

#[async_trait]
impl SchemaSource for SqliteSchemaSource {
    async fn list_base_tables(&mut self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| AskError::connection(format!("Failed to fetch tables: {e}")))
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT name, type, "notnull", pk
            FROM pragma_table_info(?1)
            ORDER BY cid
            "#,
        )
        .bind(table)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| AskError::connection(format!("Failed to fetch columns for {table}: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(name, declared, not_null, pk)| {
                let max_length = declared_max_length(&declared);
                let data_type = if declared.is_empty() {
                    "any".to_string()
                } else {
                    declared.to_lowercase()
                };
                ColumnDescriptor::new(name, data_type, not_null == 0 && pk == 0, max_length)
            })
            .collect())
    }
}

/// Extracts `n` from declared types such as `VARCHAR(n)`.
fn declared_max_length(declared: &str) -> Option<i32> {
    static LENGTH: OnceLock<Option<Regex>> = OnceLock::new();
    LENGTH
        .get_or_init(|| Regex::new(r"^\s*\w[\w\s]*\(\s*(\d+)\s*\)\s*$").ok())
        .as_ref()?
        .captures(declared)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

fn convert_row(row: &SqliteRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            (
                col.name().to_string(),
                convert_value(row, i, col.type_info().name()),
            )
        })
        .collect()
}

/// Converts one cell using its runtime storage class.
///
/// SQLite is dynamically typed, so the declared column type only refines
/// the result (booleans, dates); the stored value decides how it decodes.
fn convert_value(row: &SqliteRow, index: usize, declared: &str) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };
    let declared = declared.to_uppercase();

    match storage.as_str() {
        "INTEGER" | "BOOLEAN" | "INT8" | "BIGINT" => {
            let value = row.try_get_unchecked::<i64, _>(index).ok();
            match value {
                Some(v) if declared == "BOOLEAN" => Value::Bool(v != 0),
                Some(v) => Value::Int(v),
                None => Value::Null,
            }
        }
        "REAL" | "NUMERIC" => row
            .try_get_unchecked::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get_unchecked::<Vec<u8>, _>(index)
            .map(|b| Value::Text(format!("<{} bytes>", b.len())))
            .unwrap_or(Value::Null),
        _ => match row.try_get_unchecked::<String, _>(index) {
            Ok(text) => parse_declared_temporal(&declared, &text).unwrap_or(Value::Text(text)),
            Err(_) => Value::Null,
        },
    }
}

/// Parses text stored in a DATE or DATETIME column.
fn parse_declared_temporal(declared: &str, text: &str) -> Option<Value> {
    match declared {
        "DATE" => chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(Value::Date),
        "DATETIME" => ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(text, fmt).ok())
            .map(Value::DateTime),
        _ => None,
    }
}
