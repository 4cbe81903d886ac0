//! Database module for schema_drift
//!
//! This module hands out pooled connections and database handles.

pub mod connection;

// Re-export key types
pub use connection::{Connection, DataSource, Database};
