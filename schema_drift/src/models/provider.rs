//! Reference schema providers
//!
//! A provider turns an [`EntityMapping`] into the snapshot the live database
//! is compared against. Providers are registered by name in a
//! [`ProviderRegistry`]; the built-in [`ModelSchemaProvider`] is registered
//! as [`MODEL_PROVIDER`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::{Config, NamingConfig, TypeMappingConfig};
use crate::db::DataSource;
use crate::error::{Error, Result};
use crate::models::registry::{ModelInfo, ModelRegistry};
use crate::schema::types::{Column, ForeignKey, Index, PrimaryKey, SchemaSnapshot, Table};
use crate::utils::naming::{
    get_column_name, get_foreign_key_name, get_index_name, get_max_identifier_length,
    get_table_name, truncate_identifier,
};

/// Name the [`ModelSchemaProvider`] is registered under
pub const MODEL_PROVIDER: &str = "models";

/// Produces the expected schema for an entity mapping
pub trait ReferenceSchemaProvider: Send + Sync {
    fn reference_snapshot(&self, mapping: &EntityMapping) -> Result<SchemaSnapshot>;
}

/// Name-indexed set of reference schema providers
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ReferenceSchemaProvider>>,
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in providers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(MODEL_PROVIDER, ModelSchemaProvider);
        registry
    }

    pub fn register(&mut self, name: &str, provider: impl ReferenceSchemaProvider + 'static) {
        self.providers.insert(name.to_string(), Arc::new(provider));
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn ReferenceSchemaProvider>> {
        self.providers.get(name).cloned().ok_or_else(|| {
            Error::ProviderUnavailable(format!("No reference schema provider registered as '{}'", name))
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Entity mapping handed to a reference schema provider
#[derive(Debug, Clone)]
pub struct EntityMapping {
    registry: ModelRegistry,
    naming: NamingConfig,
    type_mapping: TypeMappingConfig,
    index_foreign_keys: bool,
    dialect: String,
    schema_name: Option<String>,
    data_source: Option<DataSource>,
    provider: String,
}

impl EntityMapping {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            registry,
            naming: NamingConfig::default(),
            type_mapping: TypeMappingConfig::default(),
            index_foreign_keys: false,
            dialect: "postgres".to_string(),
            schema_name: None,
            data_source: None,
            provider: MODEL_PROVIDER.to_string(),
        }
    }

    /// Mapping settings taken from configuration
    pub fn from_config(registry: ModelRegistry, config: &Config) -> Self {
        Self {
            registry,
            naming: config.naming.clone(),
            type_mapping: config.type_mapping.clone(),
            index_foreign_keys: config.mapping.index_foreign_keys,
            dialect: config.database.driver.clone(),
            schema_name: config.database.schema.clone(),
            data_source: None,
            provider: config.mapping.provider.clone(),
        }
    }

    pub fn with_naming(mut self, naming: NamingConfig) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_type_mapping(mut self, type_mapping: TypeMappingConfig) -> Self {
        self.type_mapping = type_mapping;
        self
    }

    pub fn with_index_foreign_keys(mut self, index_foreign_keys: bool) -> Self {
        self.index_foreign_keys = index_foreign_keys;
        self
    }

    pub fn with_dialect(mut self, dialect: &str) -> Self {
        self.dialect = dialect.to_string();
        self
    }

    pub fn with_schema_name(mut self, schema_name: &str) -> Self {
        self.schema_name = Some(schema_name.to_string());
        self
    }

    /// Connection source used when the caller supplies no connection
    pub fn with_data_source(mut self, data_source: DataSource) -> Self {
        self.data_source = Some(data_source);
        self
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn naming(&self) -> &NamingConfig {
        &self.naming
    }

    pub fn type_mapping(&self) -> &TypeMappingConfig {
        &self.type_mapping
    }

    pub fn index_foreign_keys(&self) -> bool {
        self.index_foreign_keys
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema_name.as_deref()
    }

    pub fn data_source(&self) -> Option<&DataSource> {
        self.data_source.as_ref()
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }
}

/// Builds the reference schema from the registered entity models
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSchemaProvider;

impl ReferenceSchemaProvider for ModelSchemaProvider {
    fn reference_snapshot(&self, mapping: &EntityMapping) -> Result<SchemaSnapshot> {
        let mut snapshot = SchemaSnapshot::new(mapping.schema_name.clone());

        for model in mapping.registry.get_models().values() {
            snapshot.add_table(model_table(model, mapping)?);
        }

        tracing::debug!(
            tables = snapshot.tables.len(),
            dialect = %mapping.dialect,
            "Built reference snapshot from models"
        );
        Ok(snapshot)
    }
}

fn model_table(model: &ModelInfo, mapping: &EntityMapping) -> Result<Table> {
    let naming = &mapping.naming;
    let max_length = get_max_identifier_length(&mapping.dialect);
    let identifier = |name: String| truncate_identifier(&name, max_length);

    let table_name = identifier(model.table_name.clone().unwrap_or_else(|| {
        get_table_name(&model.name, &naming.table_style, naming.pluralize_tables)
    }));
    let mut table = Table::new(&table_name);

    let mut pk_columns = Vec::new();
    for field in &model.fields {
        let column_name = identifier(
            field
                .column_name
                .clone()
                .unwrap_or_else(|| get_column_name(&field.name, &naming.column_style)),
        );

        let data_type = match &field.db_type {
            Some(db_type) => db_type.clone(),
            None => map_type_to_db_type(&field.rust_type, &mapping.type_mapping, &mapping.dialect)?,
        };

        table.add_column(Column {
            name: column_name.clone(),
            data_type,
            nullable: field.nullable && !field.primary_key,
            default: field.default.clone(),
            auto_increment: field.auto_increment,
            comment: field.comment.clone(),
        });

        if field.primary_key {
            pk_columns.push(column_name.clone());
        } else if field.unique {
            table.add_index(Index {
                name: identifier(get_index_name(
                    &naming.index_pattern,
                    &table_name,
                    std::slice::from_ref(&column_name),
                )),
                columns: vec![column_name.clone()],
                is_unique: true,
            });
        }

        if let Some(fk) = &field.foreign_key {
            table.add_foreign_key(ForeignKey {
                name: identifier(get_foreign_key_name(
                    &naming.constraint_pattern,
                    &table_name,
                    &column_name,
                )),
                columns: vec![column_name.clone()],
                ref_table: fk.ref_table.clone(),
                ref_columns: vec![fk.ref_column.clone()],
                on_delete: fk.on_delete.clone(),
                on_update: fk.on_update.clone(),
            });

            if mapping.index_foreign_keys && !field.unique && !field.primary_key {
                table.add_index(Index {
                    name: identifier(get_index_name(
                        &naming.index_pattern,
                        &table_name,
                        std::slice::from_ref(&column_name),
                    )),
                    columns: vec![column_name],
                    is_unique: false,
                });
            }
        }
    }

    if !pk_columns.is_empty() {
        table.set_primary_key(PrimaryKey {
            name: Some(identifier(format!("pk_{}", table_name))),
            columns: pk_columns,
        });
    }

    Ok(table)
}

/// Map a Rust type to a database type
///
/// Custom mappings win over overrides, which win over the built-in table.
/// `Option<T>` maps like `T`.
pub fn map_type_to_db_type(
    rust_type: &str,
    type_mapping: &TypeMappingConfig,
    dialect: &str,
) -> Result<String> {
    let rust_type: String = rust_type.chars().filter(|c| !c.is_whitespace()).collect();
    let rust_type = rust_type
        .strip_prefix("Option<")
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(&rust_type);

    if let Some(custom) = &type_mapping.custom {
        if let Some(mapping) = custom.iter().find(|m| m.rust_type == rust_type) {
            return Ok(mapping.db_type.clone());
        }
    }

    if let Some(db_type) = type_mapping.override_.as_ref().and_then(|o| o.get(rust_type)) {
        return Ok(db_type.clone());
    }

    let postgres = matches!(dialect, "postgres" | "postgresql");
    let db_type = match rust_type {
        "String" | "&str" => "VARCHAR(255)",
        "i8" | "i16" | "u8" => "SMALLINT",
        "i32" | "u16" => "INTEGER",
        "i64" | "u32" | "u64" => "BIGINT",
        "f32" => "REAL",
        "f64" => "DOUBLE PRECISION",
        "bool" => "BOOLEAN",
        "Vec<u8>" if postgres => "BYTEA",
        "Vec<u8>" => "BLOB",
        t if t.ends_with("NaiveDateTime") => "TIMESTAMP",
        t if t.contains("DateTime") && postgres => "TIMESTAMP WITH TIME ZONE",
        t if t.contains("DateTime") => "TIMESTAMP",
        t if t.ends_with("NaiveDate") => "DATE",
        t if t.ends_with("NaiveTime") => "TIME",
        t if t.ends_with("Uuid") && postgres => "UUID",
        t if t.ends_with("Uuid") => "CHAR(36)",
        t if t.ends_with("Decimal") => "NUMERIC(20,6)",
        t if (t.contains("Json") || t.ends_with("Value")) && postgres => "JSONB",
        t if t.contains("Json") || t.ends_with("Value") => "JSON",
        _ => {
            return Err(Error::TypeMappingError(format!(
                "No mapping found for Rust type: {}",
                rust_type
            )))
        }
    };

    Ok(db_type.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustomTypeMapping;
    use crate::models::EntityDescriptor;
    use crate::schema::types::{FieldDefinition, ForeignKeyDefinition};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn field(name: &str, rust_type: &str) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            column_name: None,
            rust_type: rust_type.to_string(),
            db_type: None,
            nullable: rust_type.starts_with("Option<"),
            primary_key: false,
            unique: false,
            auto_increment: false,
            default: None,
            foreign_key: None,
            comment: None,
        }
    }

    fn registry() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry.register_descriptor(EntityDescriptor {
            name: "UserAccount".to_string(),
            table: None,
            fields: vec![
                FieldDefinition {
                    primary_key: true,
                    auto_increment: true,
                    ..field("id", "i64")
                },
                FieldDefinition {
                    unique: true,
                    ..field("emailAddress", "String")
                },
                field("lastSeen", "Option<chrono::DateTime<chrono::Utc>>"),
            ],
        });
        registry.register_descriptor(EntityDescriptor {
            name: "Post".to_string(),
            table: Some("blog_posts".to_string()),
            fields: vec![
                FieldDefinition {
                    primary_key: true,
                    ..field("id", "i64")
                },
                FieldDefinition {
                    foreign_key: ForeignKeyDefinition::parse("user_accounts.id"),
                    ..field("author_id", "i64")
                },
            ],
        });
        registry
    }

    #[test]
    fn test_models_become_tables() {
        let naming = NamingConfig {
            pluralize_tables: true,
            ..NamingConfig::default()
        };
        let mapping = EntityMapping::new(registry())
            .with_naming(naming)
            .with_index_foreign_keys(true);

        let snapshot = ModelSchemaProvider.reference_snapshot(&mapping).expect("snapshot");

        let users = snapshot.find_table("user_accounts").expect("users table");
        assert_eq!(users.columns[1].name, "email_address");
        assert_eq!(users.columns[2].data_type, "TIMESTAMP WITH TIME ZONE");
        assert!(users.columns[2].nullable);
        assert!(!users.columns[0].nullable);
        assert!(users.columns[0].auto_increment);
        assert_eq!(
            users.primary_key,
            Some(PrimaryKey {
                name: Some("pk_user_accounts".to_string()),
                columns: vec!["id".to_string()],
            })
        );
        assert_eq!(users.indexes[0].name, "ix_user_accounts_email_address");
        assert!(users.indexes[0].is_unique);

        let posts = snapshot.find_table("blog_posts").expect("posts table");
        assert_eq!(posts.foreign_keys[0].name, "fk_blog_posts_author_id");
        assert_eq!(posts.foreign_keys[0].ref_table, "user_accounts");
        assert_eq!(posts.indexes.len(), 1);
        assert!(!posts.indexes[0].is_unique);
    }

    #[test]
    fn test_long_identifiers_are_truncated() {
        let mut registry = ModelRegistry::new();
        registry.register_descriptor(EntityDescriptor {
            name: "Thing".to_string(),
            table: Some("t".repeat(80)),
            fields: vec![field("id", "i32")],
        });

        let snapshot = ModelSchemaProvider
            .reference_snapshot(&EntityMapping::new(registry).with_dialect("postgres"))
            .expect("snapshot");

        let table = snapshot.tables.values().next().expect("one table");
        assert_eq!(table.name.len(), 63);
    }

    #[test]
    fn test_type_mapping_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert("String".to_string(), "TEXT".to_string());
        let type_mapping = TypeMappingConfig {
            custom: Some(vec![CustomTypeMapping {
                rust_type: "Money".to_string(),
                db_type: "NUMERIC(19,4)".to_string(),
            }]),
            override_: Some(overrides),
        };

        assert_eq!(map_type_to_db_type("Money", &type_mapping, "postgres").unwrap(), "NUMERIC(19,4)");
        assert_eq!(map_type_to_db_type("Option < String >", &type_mapping, "postgres").unwrap(), "TEXT");
        assert_eq!(map_type_to_db_type("Vec<u8>", &type_mapping, "sqlite").unwrap(), "BLOB");
        assert_eq!(
            map_type_to_db_type("chrono::NaiveDateTime", &type_mapping, "postgres").unwrap(),
            "TIMESTAMP"
        );
        assert!(matches!(
            map_type_to_db_type("HashSet<i32>", &type_mapping, "postgres"),
            Err(Error::TypeMappingError(_))
        ));
    }

    #[test]
    fn test_unregistered_provider_is_unavailable() {
        let registry = ProviderRegistry::new();
        assert!(matches!(registry.resolve(MODEL_PROVIDER), Err(Error::ProviderUnavailable(_))));

        let registry = ProviderRegistry::with_defaults();
        assert!(registry.resolve(MODEL_PROVIDER).is_ok());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["models"]);
    }
}
