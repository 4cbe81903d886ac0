//! Result of a comparison

use std::path::{Path, PathBuf};

use crate::changelog::ChangeLog;

/// Whether a comparison found outstanding schema updates
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    NoChanges,
    Changes(ChangeReport),
}

impl ExportOutcome {
    pub fn has_changes(&self) -> bool {
        matches!(self, ExportOutcome::Changes(_))
    }

    pub fn report(&self) -> Option<&ChangeReport> {
        match self {
            ExportOutcome::NoChanges => None,
            ExportOutcome::Changes(report) => Some(report),
        }
    }
}

/// Outstanding changes and their serialized form
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeReport {
    pub(crate) change_log: ChangeLog,
    pub(crate) text: String,
    pub(crate) written_to: Option<PathBuf>,
}

impl ChangeReport {
    pub fn change_log(&self) -> &ChangeLog {
        &self.change_log
    }

    /// The changelog in the requested format
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn change_set_count(&self) -> usize {
        self.change_log.len()
    }

    /// File the changelog was written to, if one was configured
    pub fn written_to(&self) -> Option<&Path> {
        self.written_to.as_deref()
    }
}
