//! Schema drift reporting
//!
//! The [`SchemaReporter`] compares a reference schema with a live database
//! and reports the changelog that would reconcile them. It never applies
//! anything to the database.

pub mod options;
pub mod outcome;
pub mod reporter;

pub use options::{FailureMode, ReportOptions};
pub use outcome::{ChangeReport, ExportOutcome};
pub use reporter::SchemaReporter;
