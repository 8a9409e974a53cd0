//! Query execution under row-count and time limits.

mod executor;
mod limit;

pub use executor::{ExecutionResult, QueryExecutor};
pub use limit::has_row_limit;
