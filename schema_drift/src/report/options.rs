//! Per-call report settings

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::changelog::ChangeLogFormat;
use crate::config::ReportConfig;
use crate::error::Error;

/// What a best-effort capable operation does with a failure
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Return the error to the caller
    Propagate,
    /// Log the error as a warning and report no outcome
    #[default]
    BestEffort,
}

impl FailureMode {
    /// Apply the mode to a failed check
    pub fn handle<T>(self, error: Error) -> crate::error::Result<Option<T>> {
        match self {
            FailureMode::Propagate => Err(error),
            FailureMode::BestEffort => {
                tracing::warn!(error = %error, "Failed to check schema");
                Ok(None)
            }
        }
    }
}

/// Settings applied to one comparison
///
/// Options are plain values: every call receives its own copy, so a
/// comparison's filtering is fully determined by its arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    ignored_tables: BTreeSet<String>,
    output_file: Option<PathBuf>,
    format: ChangeLogFormat,
    author: Option<String>,
    id_root: Option<String>,
    include_schema: bool,
}

impl ReportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ReportConfig) -> Self {
        let mut options = Self::new()
            .ignore_tables(config.ignore_tables.iter().cloned())
            .with_format(config.format);
        options.output_file = config.output_file.as_ref().map(PathBuf::from);
        options.author = config.author.clone();
        options
    }

    /// Add tables whose differences are left out of the report
    ///
    /// Adding a table twice has no effect; tables are never removed.
    pub fn ignore_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_tables.extend(tables.into_iter().map(Into::into));
        self
    }

    /// Write the changelog here instead of logging it
    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn with_format(mut self, format: ChangeLogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Fix the change set id root instead of deriving it from today's date
    pub fn with_id_root(mut self, id_root: impl Into<String>) -> Self {
        self.id_root = Some(id_root.into());
        self
    }

    /// Qualify generated changes with the live schema name
    pub fn with_include_schema(mut self, include_schema: bool) -> Self {
        self.include_schema = include_schema;
        self
    }

    pub fn ignored_tables(&self) -> &BTreeSet<String> {
        &self.ignored_tables
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    /// Where the changelog is written
    ///
    /// An output file without an extension takes the extension of the
    /// configured format.
    pub fn changelog_path(&self) -> Option<PathBuf> {
        let path = self.output_file.as_ref()?;
        if path.extension().is_some() {
            return Some(path.clone());
        }
        Some(path.with_extension(self.format.serializer().extension()))
    }

    pub fn format(&self) -> ChangeLogFormat {
        self.format
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn id_root(&self) -> Option<&str> {
        self.id_root.as_deref()
    }

    pub fn include_schema(&self) -> bool {
        self.include_schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_tables_is_additive_and_idempotent() {
        let once = ReportOptions::new().ignore_tables(["audit_log"]);
        let twice = once.clone().ignore_tables(["audit_log"]);
        let more = twice.clone().ignore_tables(vec!["sessions".to_string()]);

        assert_eq!(once.ignored_tables().len(), 1);
        assert_eq!(twice, once);
        assert_eq!(more.ignored_tables().len(), 2);
    }

    #[test]
    fn test_from_config() {
        let config = ReportConfig {
            output_file: Some("target/drift.yaml".to_string()),
            ignore_tables: vec!["a".to_string(), "a".to_string(), "b".to_string()],
            format: ChangeLogFormat::Yaml,
            failure_mode: FailureMode::Propagate,
            author: Some("ci".to_string()),
        };

        let options = ReportOptions::from_config(&config);
        assert_eq!(options.ignored_tables().len(), 2);
        assert_eq!(options.output_file(), Some(Path::new("target/drift.yaml")));
        assert_eq!(options.format(), ChangeLogFormat::Yaml);
        assert_eq!(options.author(), Some("ci"));
        assert!(!options.include_schema());
    }

    #[test]
    fn test_changelog_path_defaults_extension_to_format() {
        let options = ReportOptions::new()
            .with_output_file("target/drift")
            .with_format(ChangeLogFormat::Json);
        assert_eq!(options.changelog_path(), Some(PathBuf::from("target/drift.json")));

        let explicit = options.with_output_file("target/drift.txt");
        assert_eq!(explicit.changelog_path(), Some(PathBuf::from("target/drift.txt")));

        assert_eq!(ReportOptions::new().changelog_path(), None);
    }

    #[test]
    fn test_propagate_returns_error() {
        let result: crate::error::Result<Option<()>> =
            FailureMode::Propagate.handle(Error::DiffFailure("boom".to_string()));
        assert!(matches!(result, Err(Error::DiffFailure(_))));

        let result: crate::error::Result<Option<()>> =
            FailureMode::BestEffort.handle(Error::DiffFailure("boom".to_string()));
        assert!(matches!(result, Ok(None)));
    }
}
