//! The schema comparison and reporting workflow

use std::fs;

use crate::changelog::{DiffOutputControl, DiffToChangeLog, TableNameFilter};
use crate::db::{Connection, DataSource, Database};
use crate::error::{Error, Result};
use crate::models::provider::{EntityMapping, ProviderRegistry, ReferenceSchemaProvider};
use crate::report::options::{FailureMode, ReportOptions};
use crate::report::outcome::{ChangeReport, ExportOutcome};
use crate::schema::analyzer::SnapshotSource;
use crate::schema::diff;
use crate::schema::types::SchemaSnapshot;

/// Compares a reference schema with a live database and reports the
/// outstanding changelog
///
/// Reports go to the `tracing` subscriber at warn level, or to the output
/// file configured in [`ReportOptions`]. Nothing is ever executed against
/// the database.
#[derive(Debug, Clone, Default)]
pub struct SchemaReporter {
    providers: ProviderRegistry,
}

impl SchemaReporter {
    /// A reporter without any reference schema provider
    pub fn new() -> Self {
        Self::default()
    }

    /// A reporter with the built-in model provider registered
    pub fn with_default_providers() -> Self {
        Self {
            providers: ProviderRegistry::with_defaults(),
        }
    }

    pub fn with_providers(providers: ProviderRegistry) -> Self {
        Self { providers }
    }

    pub fn register_provider(&mut self, name: &str, provider: impl ReferenceSchemaProvider + 'static) {
        self.providers.register(name, provider);
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Compare two snapshots and report the differences
    ///
    /// The changelog is serialized before its emptiness is checked, so the
    /// reported text and the outcome always describe the same change sets.
    pub fn compare_snapshots(
        &self,
        reference: &SchemaSnapshot,
        actual: &SchemaSnapshot,
        options: &ReportOptions,
    ) -> Result<ExportOutcome> {
        let diff = diff::compare(reference, actual)?;

        let mut control = DiffOutputControl::new(options.include_schema());
        if !options.ignored_tables().is_empty() {
            control.set_object_change_filter(TableNameFilter::new(
                options.ignored_tables().iter().cloned(),
            ));
        }

        let mut generator = DiffToChangeLog::new(&diff, &control);
        if let Some(id_root) = options.id_root() {
            generator = generator.with_id_root(id_root);
        }
        if let Some(author) = options.author() {
            generator = generator.with_author(author);
        }

        let change_log = generator.generate_change_log();
        let text = options.format().serializer().serialize(&change_log)?;

        if change_log.is_empty() {
            tracing::debug!("No outstanding schema updates found");
            return Ok(ExportOutcome::NoChanges);
        }

        let written_to = match options.changelog_path() {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, &text)?;
                tracing::info!(
                    path = %path.display(),
                    change_sets = change_log.len(),
                    "Wrote outstanding schema updates"
                );
                Some(path)
            }
            None => {
                tracing::warn!("Outstanding schema updates:\n{}", text);
                None
            }
        };

        Ok(ExportOutcome::Changes(ChangeReport {
            change_log,
            text,
            written_to,
        }))
    }

    /// Snapshot both databases and compare them
    ///
    /// `schema` replaces the default schema of the actual database before it
    /// is inspected.
    pub async fn compare_databases<R>(
        &self,
        reference: &mut R,
        actual: &mut Database<'_>,
        schema: Option<&str>,
        options: &ReportOptions,
    ) -> Result<ExportOutcome>
    where
        R: SnapshotSource + ?Sized,
    {
        if let Some(schema) = schema {
            actual.set_default_schema_name(schema);
        }

        let reference_snapshot = reference.snapshot().await?;
        let actual_snapshot = actual.snapshot().await?;
        tracing::debug!(
            reference_tables = reference_snapshot.tables.len(),
            actual_tables = actual_snapshot.tables.len(),
            "Captured snapshots"
        );

        self.compare_snapshots(&reference_snapshot, &actual_snapshot, options)
    }

    /// Compare against a caller-owned connection
    pub async fn compare_connection<R>(
        &self,
        reference: &mut R,
        connection: &mut Connection,
        schema: Option<&str>,
        options: &ReportOptions,
    ) -> Result<ExportOutcome>
    where
        R: SnapshotSource + ?Sized,
    {
        let mut database = Database::new(connection);
        self.compare_databases(reference, &mut database, schema, options)
            .await
    }

    /// Compare against a connection checked out of `data_source`
    ///
    /// The connection goes back to the pool before this returns.
    pub async fn compare_data_source<R>(
        &self,
        reference: &mut R,
        data_source: &DataSource,
        schema: Option<&str>,
        options: &ReportOptions,
    ) -> Result<ExportOutcome>
    where
        R: SnapshotSource + ?Sized,
    {
        let mut connection = data_source.acquire().await?;
        self.compare_connection(reference, &mut connection, schema, options)
            .await
    }

    /// Compare the schema expected by an entity mapping with the database
    ///
    /// The reference schema comes from the provider registered under the
    /// mapping's provider name. Without `connection` one is taken from the
    /// mapping's data source. With [`FailureMode::BestEffort`] failures are
    /// logged and `Ok(None)` is returned, so "no differences" and "check
    /// failed" can only be told apart from the log.
    pub async fn compare_against_mapping(
        &self,
        mapping: &EntityMapping,
        connection: Option<&mut Connection>,
        schema: Option<&str>,
        options: &ReportOptions,
        failure_mode: FailureMode,
    ) -> Result<Option<ExportOutcome>> {
        match self.check_mapping(mapping, connection, schema, options).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(error) => failure_mode.handle(error),
        }
    }

    async fn check_mapping(
        &self,
        mapping: &EntityMapping,
        connection: Option<&mut Connection>,
        schema: Option<&str>,
        options: &ReportOptions,
    ) -> Result<ExportOutcome> {
        let provider = self.providers.resolve(mapping.provider())?;
        let mut reference = provider.reference_snapshot(mapping)?;
        let schema = schema.or(mapping.schema_name());

        match connection {
            Some(connection) => {
                self.compare_connection(&mut reference, connection, schema, options)
                    .await
            }
            None => {
                let data_source = mapping.data_source().ok_or_else(|| {
                    Error::ConnectionFailure(
                        "no connection supplied and the entity mapping has no data source"
                            .to_string(),
                    )
                })?;
                self.compare_data_source(&mut reference, data_source, schema, options)
                    .await
            }
        }
    }
}
