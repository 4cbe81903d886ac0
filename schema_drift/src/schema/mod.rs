//! Schema module for schema_drift
//!
//! This module handles snapshot capture and comparison.

pub mod analyzer;
pub mod diff;
pub mod types;

// Re-export key types
pub use analyzer::SnapshotSource;
pub use diff::{ColumnChange, ColumnDifference, DiffResult, TableScoped};
pub use types::{
    Column, FieldDefinition, ForeignKey, ForeignKeyDefinition, Index, PrimaryKey, SchemaSnapshot,
    Table,
};
