//! Shared fixtures.

use std::path::Path;
use std::sync::Arc;

use db_ask::config::{ConnectionConfig, Limits, LlmConfig};
use db_ask::db::{ColumnDescriptor, DataStore, DatabaseBackend, SchemaSnapshot, SqliteStore};
use db_ask::llm::LlmClient;
use db_ask::orchestrator::Orchestrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// `EDC_BRAND(BR_CODE int, BR_DESC varchar)`.
pub fn brand_schema() -> SchemaSnapshot {
    SchemaSnapshot::new().with_table(
        "EDC_BRAND",
        vec![
            ColumnDescriptor::new("BR_CODE", "int", false, None),
            ColumnDescriptor::new("BR_DESC", "varchar", true, Some(100)),
        ],
    )
}

pub fn orchestrator(store: Arc<dyn DataStore>, llm: Arc<dyn LlmClient>) -> Orchestrator {
    Orchestrator::new(store, llm, &LlmConfig::default(), &Limits::default())
}

/// Creates a SQLite file with `brands` rows in EDC_BRAND, a small sales
/// table, a SECRET table that no question should reach, and a view.
pub async fn seed_sqlite(path: &Path, brands: u32) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for statement in [
        "CREATE TABLE EDC_BRAND (BR_CODE INTEGER PRIMARY KEY, BR_DESC VARCHAR(100))",
        "CREATE TABLE SALES (SALE_DATE DATE NOT NULL, BR_CODE INTEGER NOT NULL, AMOUNT REAL)",
        "INSERT INTO SALES VALUES ('2024-01-01', 1, 10.5), ('2024-02-01', 1, 12.0), ('2024-03-01', 2, 7.25)",
        "CREATE TABLE SECRET (ID INTEGER PRIMARY KEY AUTOINCREMENT, PW TEXT NOT NULL)",
        "INSERT INTO SECRET (PW) VALUES ('hunter2')",
        "CREATE VIEW BRAND_SALES AS SELECT BR_CODE, SUM(AMOUNT) AS TOTAL FROM SALES GROUP BY BR_CODE",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    sqlx::query(
        "INSERT INTO EDC_BRAND (BR_CODE, BR_DESC)
         WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?1)
         SELECT n, 'Brand ' || n FROM seq",
    )
    .bind(brands)
    .execute(&pool)
    .await
    .unwrap();

    pool.close().await;
}

/// Opens the seeded file the way the binary does: read-only.
pub async fn open_sqlite(path: &Path) -> Arc<dyn DataStore> {
    let config = ConnectionConfig {
        backend: DatabaseBackend::Sqlite,
        path: Some(path.to_path_buf()),
        ..Default::default()
    };
    Arc::new(SqliteStore::connect(&config).await.unwrap())
}
