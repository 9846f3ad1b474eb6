//! Table stores for the gold-layer pipeline.
//!
//! The pipeline reads its input table from, and writes its output table to,
//! a [`DataStore`]. Two stores are provided:
//!
//! - [`MemoryStore`]: tables held in memory
//! - [`CsvStore`]: a directory with one subdirectory per schema and one CSV
//!   file per table
//!
//! Both understand the same query dialect (`SELECT * FROM schema.table`,
//! see [`TableQuery`]) and the same write policies.

mod config;
mod csv;
mod error;
mod memory;
mod query;
mod store;

// === Error Types ===
pub use error::{Result, StoreError};

// === Configuration ===
pub use config::{DatabaseConfig, Redacted};

// === Stores ===
pub use csv::CsvStore;
pub use memory::MemoryStore;
pub use query::TableQuery;
pub use store::{DataStore, is_system_schema};
