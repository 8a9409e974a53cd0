//! Live schema capture.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{DataStore, SchemaSnapshot};
use crate::error::{AskError, Result};

/// Captures a fresh structural snapshot of the store on every call.
///
/// Nothing is cached between calls, so each request sees the schema as it is
/// at that moment.
pub struct SchemaCatalog {
    store: Arc<dyn DataStore>,
    timeout: Duration,
}

impl SchemaCatalog {
    /// Creates a catalog over the given store.
    pub fn new(store: Arc<dyn DataStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Enumerates base tables and their columns.
    ///
    /// Every failure, including a timeout, is reported as a connection error.
    /// The scoped connection is released on all exit paths because the
    /// schema source owning it is dropped when this future completes or is
    /// cancelled.
    pub async fn capture(&self) -> Result<SchemaSnapshot> {
        let start = Instant::now();

        let snapshot = tokio::time::timeout(self.timeout, self.read_snapshot())
            .await
            .map_err(|_| {
                AskError::connection(format!(
                    "Schema introspection timed out after {} seconds",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(as_connectivity)?;

        debug!(
            tables = snapshot.len(),
            columns = snapshot.column_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Captured schema snapshot"
        );

        Ok(snapshot)
    }

    async fn read_snapshot(&self) -> Result<SchemaSnapshot> {
        let mut source = self.store.schema_source().await?;
        let tables = source.list_base_tables().await?;

        let mut snapshot = SchemaSnapshot::new();
        for table in tables {
            let columns = source.list_columns(&table).await?;
            snapshot.insert(table, columns);
        }
        Ok(snapshot)
    }
}

fn as_connectivity(error: AskError) -> AskError {
    match error {
        AskError::Connection(_) => error,
        other => AskError::connection(format!(
            "Schema introspection failed: {}",
            other.message()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnDescriptor, MockStore};

    fn catalog(store: MockStore) -> SchemaCatalog {
        SchemaCatalog::new(Arc::new(store), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_capture_reads_every_table() {
        let schema = SchemaSnapshot::new()
            .with_table(
                "orders",
                vec![ColumnDescriptor::new("id", "integer", false, None)],
            )
            .with_table(
                "customers",
                vec![
                    ColumnDescriptor::new("id", "integer", false, None),
                    ColumnDescriptor::new("name", "varchar", true, Some(80)),
                ],
            );
        let snapshot = catalog(MockStore::new().with_schema(schema.clone()))
            .capture()
            .await
            .unwrap();

        assert_eq!(snapshot, schema);
        assert_eq!(
            snapshot.table_names().collect::<Vec<_>>(),
            vec!["customers", "orders"]
        );
    }

    #[tokio::test]
    async fn test_capture_maps_failures_to_connectivity() {
        let err = catalog(MockStore::new().with_introspection_error("catalog query failed"))
            .capture()
            .await
            .unwrap_err();

        assert!(matches!(err, AskError::Connection(_)));
        assert!(err.to_string().contains("catalog query failed"));
    }

    #[tokio::test]
    async fn test_capture_unreachable_store() {
        let err = catalog(MockStore::new().unreachable())
            .capture()
            .await
            .unwrap_err();
        assert!(matches!(err, AskError::Connection(_)));
    }
}
