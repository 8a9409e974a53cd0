//! db-ask - natural-language questions over a relational database.
//!
//! A question is translated to SQL by an external model, checked against a
//! read-only policy, executed under row and time limits, and returned with
//! an inferred chart mapping. [`orchestrator::Orchestrator`] runs the
//! pipeline; the other modules are its stages and their collaborators.

pub mod chart;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod query;
pub mod safety;
