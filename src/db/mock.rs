//! In-memory data store for testing.
//!
//! Returns canned rows keyed by SQL patterns and records every statement it
//! receives, so tests can assert on what was (or was not) executed.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ColumnDescriptor, DataStore, Row, SchemaSnapshot, SchemaSource, SqlDialect};
use crate::error::{AskError, Result};

/// A mock store with a fixed schema and canned results.
pub struct MockStore {
    schema: SchemaSnapshot,
    results: Vec<(String, Vec<Row>)>,
    count: Option<i64>,
    count_fails: bool,
    query_error: Option<String>,
    introspection_error: Option<String>,
    unreachable: bool,
    delay: Option<Duration>,
    dialect: SqlDialect,
    executed: Mutex<Vec<String>>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// Creates an empty mock store speaking the SQLite dialect.
    pub fn new() -> Self {
        Self {
            schema: SchemaSnapshot::default(),
            results: Vec::new(),
            count: None,
            count_fails: false,
            query_error: None,
            introspection_error: None,
            unreachable: false,
            delay: None,
            dialect: SqlDialect::Sqlite,
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Sets the schema returned by introspection.
    pub fn with_schema(mut self, schema: SchemaSnapshot) -> Self {
        self.schema = schema;
        self
    }

    /// Returns `rows` for statements containing `pattern` (case-insensitive).
    pub fn with_rows(mut self, pattern: impl Into<String>, rows: Vec<Row>) -> Self {
        self.results.push((pattern.into(), rows));
        self
    }

    /// Overrides the value returned by count statements.
    pub fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    /// Makes count statements fail.
    pub fn with_failing_count(mut self) -> Self {
        self.count_fails = true;
        self
    }

    /// Makes row statements fail with a store-reported error.
    pub fn with_query_error(mut self, message: impl Into<String>) -> Self {
        self.query_error = Some(message.into());
        self
    }

    /// Makes column introspection fail with a store-reported error.
    pub fn with_introspection_error(mut self, message: impl Into<String>) -> Self {
        self.introspection_error = Some(message.into());
        self
    }

    /// Delays every row statement.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the reported dialect.
    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Makes every operation fail as if the server were down.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Statements received so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn record(&self, sql: &str) {
        if let Ok(mut log) = self.executed.lock() {
            log.push(sql.to_string());
        }
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            return Err(AskError::connection("Cannot connect to mock store"));
        }
        Ok(())
    }

    fn matching_rows(&self, sql: &str) -> &[Row] {
        let sql_lower = sql.to_lowercase();
        self.results
            .iter()
            .find(|(pattern, _)| sql_lower.contains(&pattern.to_lowercase()))
            .map(|(_, rows)| rows.as_slice())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DataStore for MockStore {
    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    async fn schema_source(&self) -> Result<Box<dyn SchemaSource>> {
        self.check_reachable()?;
        Ok(Box::new(MockSchemaSource {
            schema: self.schema.clone(),
            error: self.introspection_error.clone(),
        }))
    }

    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> Result<Vec<Row>> {
        self.record(sql);
        self.check_reachable()?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.query_error {
            return Err(AskError::query(message.clone()));
        }
        Ok(self
            .matching_rows(sql)
            .iter()
            .take(max_rows)
            .cloned()
            .collect())
    }

    async fn fetch_count(&self, sql: &str) -> Result<i64> {
        self.record(sql);
        self.check_reachable()?;
        if self.count_fails {
            return Err(AskError::query("count not supported by mock"));
        }
        Ok(self
            .count
            .unwrap_or_else(|| self.matching_rows(sql).len() as i64))
    }

    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Schema source over a fixed snapshot.
pub struct MockSchemaSource {
    schema: SchemaSnapshot,
    error: Option<String>,
}

#[async_trait]
impl SchemaSource for MockSchemaSource {
    async fn list_base_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.schema.table_names().map(String::from).collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        if let Some(message) = &self.error {
            return Err(AskError::query(message.clone()));
        }
        Ok(self.schema.table(table).map(<[_]>::to_vec).unwrap_or_default())
    }
}
