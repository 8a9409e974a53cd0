//! PostgreSQL data store.
//!
//! Every session starts with `default_transaction_read_only = on`, so even a
//! statement that slipped past validation cannot write. Operators should
//! still connect as a role holding SELECT grants only.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use rust_decimal::prelude::ToPrimitive;
use sqlx::pool::PoolConnection;
use sqlx::postgres::types::{PgInterval, PgMoney};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Postgres, Row as SqlxRow, TypeInfo, ValueRef};
use tracing::{debug, warn};

use super::{
    map_statement_error, ColumnDescriptor, DataStore, Row, SchemaSource, SqlDialect, Value,
};
use crate::config::ConnectionConfig;
use crate::error::{AskError, Result};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL store backed by a connection pool.
#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
    schema: String,
}

impl PostgresStore {
    /// Creates a store from an existing pool.
    ///
    /// The caller is responsible for the pool's read-only settings.
    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// Connects with retry on transient failures.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;
        let options = PgConnectOptions::from_str(&conn_str)
            .map_err(|e| AskError::config(format!("Invalid connection string: {e}")))?
            .application_name("db-ask")
            .options([("default_transaction_read_only", "on")]);

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!(attempt, max = MAX_RETRY_ATTEMPTS, "Connecting to PostgreSQL");

            let result = PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options.clone())
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to {}", config.display_string());
                    return Ok(Self::from_pool(pool, config.schema_name()));
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => AskError::connection("No connection attempt was made"),
        })
    }
}

#[async_trait]
impl DataStore for PostgresStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Postgres
    }

    async fn schema_source(&self) -> Result<Box<dyn SchemaSource>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AskError::connection(format!("Failed to acquire connection: {e}")))?;
        Ok(Box::new(PgSchemaSource {
            conn,
            schema: self.schema.clone(),
        }))
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

/// Reads `information_schema` over one pooled connection.
struct PgSchemaSource {
    conn: PoolConnection<Postgres>,
    schema: String,
}

#[async_trait]
impl SchemaSource for PgSchemaSource {
    async fn list_base_tables(&mut self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| AskError::connection(format!("Failed to fetch tables: {e}")))
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let rows: Vec<(String, String, String, Option<i32>)> = sqlx::query_as(
            r#"
            SELECT
                column_name::text,
                data_type::text,
                is_nullable::text,
                character_maximum_length::int4
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|e| AskError::connection(format!("Failed to fetch columns for {table}: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, max_length)| {
                ColumnDescriptor::new(name, data_type, is_nullable == "YES", max_length)
            })
            .collect())
    }
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
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

/// Converts a single column value from a PgRow to our Value type.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),

        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Int(v as i64))
            .unwrap_or(Value::Null),

        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or(Value::Null),

        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v as f64))
            .unwrap_or(Value::Null),

        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "NUMERIC" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(index)
            .ok()
            .flatten()
            .and_then(|d| d.to_f64())
            .map(Value::Float)
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(Value::Date)
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(Value::DateTime)
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::DateTime(v.naive_utc()))
            .unwrap_or(Value::Null),

        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(|b| Value::Text(format!("<{} bytes>", b.len())))
            .unwrap_or(Value::Null),

        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::Text)
            .unwrap_or(Value::Null),

        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or(Value::Null),

        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or(Value::Null),

        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Text(v.to_string()))
            .unwrap_or(Value::Null),

        "INTERVAL" => row
            .try_get::<Option<PgInterval>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Text(format_interval(&v)))
            .unwrap_or(Value::Null),

        "MONEY" => row
            .try_get::<Option<PgMoney>, _>(index)
            .ok()
            .flatten()
            .map(|v| Value::Float(v.0 as f64 / 100.0))
            .unwrap_or(Value::Null),

        // Anything else is read as text when the driver allows it. A value
        // that cannot be decoded is reported by type name, never as NULL.
        _ => match row.try_get::<Option<String>, _>(index) {
            Ok(value) => value.map(Value::Text).unwrap_or(Value::Null),
            Err(_) => undecoded(row, index, type_name),
        },
    }
}

/// Marker for a non-null value of a type this crate cannot decode.
fn undecoded(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => Value::Null,
        _ => Value::Text(format!("<{}>", type_name.to_lowercase())),
    }
}

/// Renders an interval as `<months> mons <days> days <hh:mm:ss>`, omitting
/// zero parts.
fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    if interval.months != 0 {
        parts.push(format!("{} mons", interval.months));
    }
    if interval.days != 0 {
        parts.push(format!("{} days", interval.days));
    }
    if interval.microseconds != 0 || parts.is_empty() {
        let total = interval.microseconds.unsigned_abs() / 1_000_000;
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        parts.push(format!(
            "{sign}{:02}:{:02}:{:02}",
            total / 3600,
            (total % 3600) / 60,
            total % 60
        ));
    }
    parts.join(" ")
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &ConnectionConfig) -> AskError {
    let host = config.host.as_deref().unwrap_or("localhost");
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");
    let database = config.database.as_deref().unwrap_or("unknown");

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        AskError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") {
        AskError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        AskError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        AskError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        AskError::connection(error.to_string())
    }
}

/// Renders a script that creates a login role holding SELECT grants only.
///
/// Run it as an administrator, then point the connection config at `role`.
pub fn readonly_setup_script(role: &str, database: &str, schema: &str) -> String {
    let role = quote_ident(role);
    let database = quote_ident(database);
    let schema = quote_ident(schema);
    format!(
        "-- Read-only role for db-ask. Set a password before use:\n\
         --   ALTER ROLE {role} WITH PASSWORD '...';\n\
         CREATE ROLE {role} WITH LOGIN NOSUPERUSER NOCREATEDB NOCREATEROLE;\n\
         ALTER ROLE {role} SET default_transaction_read_only = on;\n\
         GRANT CONNECT ON DATABASE {database} TO {role};\n\
         GRANT USAGE ON SCHEMA {schema} TO {role};\n\
         GRANT SELECT ON ALL TABLES IN SCHEMA {schema} TO {role};\n\
         ALTER DEFAULT PRIVILEGES IN SCHEMA {schema} GRANT SELECT ON TABLES TO {role};\n\
         REVOKE CREATE ON SCHEMA {schema} FROM {role};\n"
    )
}

/// Double-quotes an identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
