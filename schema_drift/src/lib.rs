//! schema_drift: reports drift between an entity mapping and a live database
//!
//! schema_drift builds the schema your entity structs expect, compares it with
//! the schema a live database actually has and reports the changelog that
//! would reconcile the two. It is advisory only: nothing is ever applied to
//! the database.

extern crate self as schema_drift;

pub mod changelog;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod schema;
pub mod utils;

pub use changelog::{ChangeLog, ChangeLogFormat};
pub use config::Config;
pub use db::{Connection, DataSource, Database};
pub use error::{Error, Result};
pub use models::{
    Entity, EntityDescriptor, EntityMapping, ModelRegistry, ModelSchemaProvider, ProviderRegistry,
    ReferenceSchemaProvider,
};
pub use report::{ChangeReport, ExportOutcome, FailureMode, ReportOptions, SchemaReporter};
pub use schema::{SchemaSnapshot, SnapshotSource};
pub use schema_drift_macros::Entity;

/// Initialize schema_drift with the specified configuration file
pub async fn init(config_path: &str) -> Result<SchemaDriftClient> {
    let config = config::load_from_file(config_path)?;
    SchemaDriftClient::new(config).await
}

/// The main client for checking a database against its entity mapping
pub struct SchemaDriftClient {
    config: Config,
    data_source: DataSource,
    model_registry: ModelRegistry,
    reporter: SchemaReporter,
}

impl SchemaDriftClient {
    /// Create a new client from configuration
    pub async fn new(config: Config) -> Result<Self> {
        let data_source = DataSource::connect(&config.database).await?;

        Ok(Self::with_data_source(config, data_source))
    }

    /// Create a client over an existing data source
    pub fn with_data_source(config: Config, data_source: DataSource) -> Self {
        Self {
            config,
            data_source,
            model_registry: ModelRegistry::new(),
            reporter: SchemaReporter::with_default_providers(),
        }
    }

    /// Scan the configured model paths and register the entities found
    pub fn register_models(&mut self) -> Result<usize> {
        self.model_registry.scan_and_register(&self.config.models)
    }

    /// Register an entity type
    pub fn register<E: Entity>(&mut self) -> &mut Self {
        self.model_registry.register::<E>();
        self
    }

    /// Register an additional reference schema provider
    pub fn register_provider(&mut self, name: &str, provider: impl ReferenceSchemaProvider + 'static) {
        self.reporter.register_provider(name, provider);
    }

    /// Entity mapping for the registered models and configuration
    pub fn mapping(&self) -> EntityMapping {
        EntityMapping::from_config(self.model_registry.clone(), &self.config)
            .with_data_source(self.data_source.clone())
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions::from_config(&self.config.report)
    }

    /// Compare the registered models with the database
    ///
    /// Failures follow the configured failure mode; in best-effort mode a
    /// failed check is logged and yields `Ok(None)`.
    pub async fn check(&self) -> Result<Option<ExportOutcome>> {
        self.check_with(&self.report_options(), self.config.report.failure_mode)
            .await
    }

    pub async fn check_with(
        &self,
        options: &ReportOptions,
        failure_mode: FailureMode,
    ) -> Result<Option<ExportOutcome>> {
        self.reporter
            .compare_against_mapping(&self.mapping(), None, None, options, failure_mode)
            .await
    }

    /// Snapshot of the live database
    pub async fn snapshot_database(&self) -> Result<SchemaSnapshot> {
        let mut connection = self.data_source.acquire().await?;
        let mut database = Database::new(&mut connection);
        if let Some(schema) = &self.config.database.schema {
            database.set_default_schema_name(schema);
        }

        database.snapshot().await
    }

    /// Snapshot the registered models are expected to produce
    pub fn reference_snapshot(&self) -> Result<SchemaSnapshot> {
        let mapping = self.mapping();
        let provider = self.reporter.providers().resolve(mapping.provider())?;
        provider.reference_snapshot(&mapping)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_source(&self) -> &DataSource {
        &self.data_source
    }

    pub fn reporter(&self) -> &SchemaReporter {
        &self.reporter
    }

    pub fn model_registry(&self) -> &ModelRegistry {
        &self.model_registry
    }
}
