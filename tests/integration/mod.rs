//! Integration tests for db-ask.

pub mod common;
pub mod pipeline_test;
pub mod postgres_test;
pub mod sqlite_test;
