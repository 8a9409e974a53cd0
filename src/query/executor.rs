//! Execution of accepted queries.
//!
//! The executed text is always the validated text, optionally followed by a
//! row-limiting clause. The count estimate wraps the same text verbatim.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use super::limit::has_row_limit;
use crate::db::{DataStore, Row};
use crate::error::{AskError, Result};
use crate::safety::AcceptedQuery;

/// Rows returned by one query plus truncation metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// At most the configured cap, in result-set order.
    pub rows: Vec<Row>,

    /// More rows matched than were returned.
    pub truncated: bool,

    /// Total matching rows, when known. Equals `rows.len()` when not
    /// truncated; None when the count statement failed.
    pub total_count_estimate: Option<u64>,

    /// Statement sent to the store.
    #[serde(skip)]
    pub statement: String,

    /// Wall time for the row statement.
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Runs accepted queries with a hard row cap and a per-statement timeout.
pub struct QueryExecutor {
    store: Arc<dyn DataStore>,
    max_rows: usize,
    timeout: Duration,
}

impl QueryExecutor {
    /// Creates an executor over the given store.
    pub fn new(store: Arc<dyn DataStore>, max_rows: usize, timeout: Duration) -> Self {
        Self {
            store,
            max_rows,
            timeout,
        }
    }

    /// Executes an accepted query.
    ///
    /// Without an existing limit the statement is capped at `max_rows + 1`
    /// rows so truncation is detected exactly. Whatever the statement says,
    /// no more than `max_rows + 1` rows are read from the store.
    pub async fn execute(&self, query: &AcceptedQuery) -> Result<ExecutionResult> {
        let fetch_limit = self.max_rows.saturating_add(1);
        let statement = self.capped_statement(query, fetch_limit);
        debug!(sql = %statement, "Executing query");

        let start = Instant::now();
        let mut rows = tokio::time::timeout(
            self.timeout,
            self.store.fetch_rows(&statement, fetch_limit),
        )
        .await
        .map_err(|_| {
            AskError::timeout(format!(
                "Query timed out after {} seconds",
                self.timeout.as_secs()
            ))
        })??;
        let elapsed = start.elapsed();

        let truncated = rows.len() > self.max_rows;
        rows.truncate(self.max_rows);

        let total_count_estimate = if truncated {
            self.estimate_total(query).await
        } else {
            Some(rows.len() as u64)
        };

        debug!(
            rows = rows.len(),
            truncated,
            total = ?total_count_estimate,
            elapsed_ms = elapsed.as_millis() as u64,
            "Query finished"
        );

        Ok(ExecutionResult {
            rows,
            truncated,
            total_count_estimate,
            statement,
            elapsed,
        })
    }

    fn capped_statement(&self, query: &AcceptedQuery, fetch_limit: usize) -> String {
        let dialect = self.store.dialect();
        if has_row_limit(query.as_str(), dialect) {
            query.as_str().to_string()
        } else {
            format!("{} {}", query.as_str(), dialect.limit_clause(fetch_limit))
        }
    }

    /// Counts all matching rows. Failure is logged and yields None.
    async fn estimate_total(&self, query: &AcceptedQuery) -> Option<u64> {
        let count_sql = format!("SELECT COUNT(*) FROM ({}) AS total_count", query.as_str());

        match tokio::time::timeout(self.timeout, self.store.fetch_count(&count_sql)).await {
            Ok(Ok(count)) => u64::try_from(count).ok(),
            Ok(Err(e)) => {
                warn!(error = %e, "Count estimate failed");
                None
            }
            Err(_) => {
                warn!("Count estimate timed out");
                None
            }
        }
    }
}
