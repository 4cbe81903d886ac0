//! Model registry
//!
//! Entities are registered either through their [`Entity`] implementation or
//! by scanning source directories for structs deriving `Entity`.

use std::path::{Path, PathBuf};

use glob::Pattern;
use indexmap::IndexMap;
use quote::ToTokens;
use syn::{parse_file, Fields, Item, ItemStruct, LitBool, LitStr, Token};
use walkdir::WalkDir;

use crate::config::ModelsConfig;
use crate::error::{Error, Result};
use crate::models::{Entity, EntityDescriptor};
use crate::schema::types::{FieldDefinition, ForeignKeyDefinition};

/// Information about a registered model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    /// Source file the model was discovered in
    pub file_path: Option<PathBuf>,
    pub table_name: Option<String>,
    pub fields: Vec<FieldDefinition>,
}

impl From<EntityDescriptor> for ModelInfo {
    fn from(descriptor: EntityDescriptor) -> Self {
        Self {
            name: descriptor.name,
            file_path: None,
            table_name: descriptor.table,
            fields: descriptor.fields,
        }
    }
}

/// Registry of entity models, in registration order
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelInfo>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type
    pub fn register<E: Entity>(&mut self) -> &mut Self {
        self.register_descriptor(E::descriptor());
        self
    }

    /// Register an entity from its descriptor; a later registration under the
    /// same name replaces the earlier one
    pub fn register_descriptor(&mut self, descriptor: EntityDescriptor) {
        let info = ModelInfo::from(descriptor);
        tracing::debug!(model = %info.name, "Registered model");
        self.models.insert(info.name.clone(), info);
    }

    /// Scan directories for entity definitions and register them
    ///
    /// Returns the number of models found.
    pub fn scan_and_register(&mut self, config: &ModelsConfig) -> Result<usize> {
        let exclude_patterns = config
            .exclude_paths
            .iter()
            .flatten()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|e| {
                    Error::ModelRegistrationError(format!("Invalid exclude pattern {}: {}", pattern, e))
                })
            })
            .collect::<Result<Vec<Pattern>>>()?;

        let mut found = 0;
        for path in &config.paths {
            let base_path = Path::new(path);

            if !base_path.exists() {
                return Err(Error::ModelRegistrationError(format!(
                    "Path does not exist: {}",
                    path
                )));
            }

            let mut walker = WalkDir::new(base_path).follow_links(true);
            if !config.recursive_scan {
                walker = walker.max_depth(1);
            }

            for entry in walker.into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();

                if exclude_patterns.iter().any(|pattern| pattern.matches_path(path)) {
                    continue;
                }

                if path.is_file() && path.extension().map_or(false, |ext| ext == "rs") {
                    found += self.process_file(path)?;
                }
            }
        }

        tracing::info!(models = found, "Scanned model paths");
        Ok(found)
    }

    /// Process a Rust file and register the entities it defines
    fn process_file(&mut self, file_path: &Path) -> Result<usize> {
        let file_content = std::fs::read_to_string(file_path)?;
        let syntax = parse_file(&file_content).map_err(|e| {
            Error::SyntaxError(format!("Failed to parse {}: {}", file_path.display(), e))
        })?;

        let mut structs = Vec::new();
        collect_structs(syntax.items, &mut structs);

        let mut found = 0;
        for item_struct in structs {
            if derives_entity(&item_struct)? {
                let mut info = ModelInfo::from(descriptor_from_struct(&item_struct)?);
                info.file_path = Some(file_path.to_owned());
                tracing::debug!(model = %info.name, file = %file_path.display(), "Discovered model");
                self.models.insert(info.name.clone(), info);
                found += 1;
            }
        }

        Ok(found)
    }

    /// Get all registered models
    pub fn get_models(&self) -> &IndexMap<String, ModelInfo> {
        &self.models
    }

    /// Get a specific model by name
    pub fn get_model(&self, name: &str) -> Option<&ModelInfo> {
        self.models.get(name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Structs at file level and inside inline modules
fn collect_structs(items: Vec<Item>, structs: &mut Vec<ItemStruct>) {
    for item in items {
        match item {
            Item::Struct(item_struct) => structs.push(item_struct),
            Item::Mod(module) => {
                if let Some((_, items)) = module.content {
                    collect_structs(items, structs);
                }
            }
            _ => {}
        }
    }
}

fn derives_entity(item_struct: &ItemStruct) -> Result<bool> {
    let mut derives = false;

    for attr in item_struct.attrs.iter().filter(|attr| attr.path().is_ident("derive")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.segments.last().map_or(false, |segment| segment.ident == "Entity") {
                derives = true;
            }
            Ok(())
        })
        .map_err(|e| {
            Error::SyntaxError(format!("Invalid derive on {}: {}", item_struct.ident, e))
        })?;
    }

    Ok(derives)
}

/// `key` or `key = true|false`
fn flag(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<bool> {
    if meta.input.peek(Token![=]) {
        let value: LitBool = meta.value()?.parse()?;
        Ok(value.value)
    } else {
        Ok(true)
    }
}

fn string(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: LitStr = meta.value()?.parse()?;
    Ok(value.value())
}

/// Build a descriptor from `#[entity(...)]` and `#[column(...)]` attributes
fn descriptor_from_struct(item_struct: &ItemStruct) -> Result<EntityDescriptor> {
    let name = item_struct.ident.to_string();
    let syntax_error =
        |e: syn::Error| Error::SyntaxError(format!("Invalid attribute on {}: {}", name, e));

    let mut table = None;
    for attr in item_struct.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                table = Some(string(&meta)?);
                Ok(())
            } else {
                Err(meta.error("unsupported entity attribute"))
            }
        })
        .map_err(syntax_error)?;
    }

    let named = match &item_struct.fields {
        Fields::Named(named) => &named.named,
        _ => {
            return Err(Error::ModelRegistrationError(format!(
                "Only named fields are supported in struct: {}",
                name
            )))
        }
    };

    let mut fields = Vec::with_capacity(named.len());
    for field in named {
        let Some(ident) = &field.ident else { continue };
        let rust_type: String = field
            .ty
            .to_token_stream()
            .to_string()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        let mut definition = FieldDefinition {
            name: ident.to_string(),
            column_name: None,
            nullable: rust_type.starts_with("Option<"),
            rust_type,
            db_type: None,
            primary_key: false,
            unique: false,
            auto_increment: false,
            default: None,
            foreign_key: None,
            comment: None,
        };

        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("column")) {
            attr.parse_nested_meta(|meta| {
                let key = meta
                    .path
                    .get_ident()
                    .map(|ident| ident.to_string())
                    .unwrap_or_default();
                match key.as_str() {
                    "name" => definition.column_name = Some(string(&meta)?),
                    "db_type" => definition.db_type = Some(string(&meta)?),
                    "primary_key" => definition.primary_key = flag(&meta)?,
                    "unique" => definition.unique = flag(&meta)?,
                    "nullable" => definition.nullable = flag(&meta)?,
                    "auto_increment" => definition.auto_increment = flag(&meta)?,
                    "default" => definition.default = Some(string(&meta)?),
                    "comment" => definition.comment = Some(string(&meta)?),
                    "references" => {
                        let reference = string(&meta)?;
                        definition.foreign_key = Some(
                            ForeignKeyDefinition::parse(&reference)
                                .ok_or_else(|| meta.error("expected `table.column`"))?,
                        );
                    }
                    _ => return Err(meta.error("unsupported column attribute")),
                }
                Ok(())
            })
            .map_err(syntax_error)?;
        }

        fields.push(definition);
    }

    Ok(EntityDescriptor { name, table, fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const MODELS: &str = r#"
        use schema_drift::Entity;

        #[derive(Debug, Entity)]
        #[entity(table = "app_users")]
        pub struct User {
            #[column(primary_key, auto_increment)]
            pub id: i64,
            #[column(unique, db_type = "VARCHAR(320)")]
            pub email: String,
            pub nickname: Option<String>,
        }

        #[derive(Debug)]
        pub struct NotAnEntity {
            pub id: i64,
        }

        pub mod nested {
            #[derive(schema_drift::Entity)]
            pub struct Post {
                #[column(primary_key)]
                pub id: i64,
                #[column(name = "author", references = "app_users.id", nullable = false)]
                pub author_id: i64,
            }
        }
    "#;

    #[test]
    fn test_scan_registers_derived_entities() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("models.rs"), MODELS).expect("write models");

        let mut registry = ModelRegistry::new();
        let config = ModelsConfig {
            paths: vec![dir.path().display().to_string()],
            ..ModelsConfig::default()
        };

        assert_eq!(registry.scan_and_register(&config).expect("scan"), 2);

        let user = registry.get_model("User").expect("User registered");
        assert_eq!(user.table_name.as_deref(), Some("app_users"));
        assert!(user.fields[0].primary_key && user.fields[0].auto_increment);
        assert_eq!(user.fields[1].db_type.as_deref(), Some("VARCHAR(320)"));
        assert!(user.fields[2].nullable);
        assert_eq!(user.fields[2].rust_type, "Option<String>");

        let post = registry.get_model("Post").expect("Post registered");
        assert_eq!(post.fields[1].column_name.as_deref(), Some("author"));
        assert_eq!(
            post.fields[1].foreign_key.as_ref().map(|fk| fk.ref_table.as_str()),
            Some("app_users")
        );
        assert!(registry.get_model("NotAnEntity").is_none());
    }

    #[test]
    fn test_scan_honors_excludes_and_depth() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("generated")).expect("mkdir");
        fs::create_dir_all(dir.path().join("deep")).expect("mkdir");
        fs::write(dir.path().join("generated/models.rs"), MODELS).expect("write");
        fs::write(dir.path().join("deep/models.rs"), MODELS).expect("write");

        let mut registry = ModelRegistry::new();
        let config = ModelsConfig {
            paths: vec![dir.path().display().to_string()],
            exclude_paths: Some(vec!["**/generated/**".to_string()]),
            recursive_scan: true,
        };
        assert_eq!(registry.scan_and_register(&config).expect("scan"), 2);

        let mut shallow = ModelRegistry::new();
        let config = ModelsConfig {
            recursive_scan: false,
            ..config
        };
        assert_eq!(shallow.scan_and_register(&config).expect("scan"), 0);
        assert!(shallow.is_empty());
    }

    #[test]
    fn test_missing_path_fails() {
        let mut registry = ModelRegistry::new();
        let config = ModelsConfig {
            paths: vec!["/no/such/models".to_string()],
            ..ModelsConfig::default()
        };

        assert!(matches!(
            registry.scan_and_register(&config),
            Err(Error::ModelRegistrationError(_))
        ));
    }

    #[test]
    fn test_invalid_reference_is_syntax_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("bad.rs"),
            r#"
            #[derive(Entity)]
            struct Broken {
                #[column(references = "nodot")]
                parent: i64,
            }
            "#,
        )
        .expect("write");

        let mut registry = ModelRegistry::new();
        let config = ModelsConfig {
            paths: vec![dir.path().display().to_string()],
            ..ModelsConfig::default()
        };

        assert!(matches!(registry.scan_and_register(&config), Err(Error::SyntaxError(_))));
    }

    #[test]
    fn test_malformed_derive_list_is_syntax_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("bad_derive.rs"),
            r#"
            #[derive(Debug = 1, Entity)]
            struct Broken {
                id: i64,
            }
            "#,
        )
        .expect("write");

        let mut registry = ModelRegistry::new();
        let config = ModelsConfig {
            paths: vec![dir.path().display().to_string()],
            ..ModelsConfig::default()
        };

        assert!(matches!(registry.scan_and_register(&config), Err(Error::SyntaxError(_))));
        assert!(registry.is_empty());
    }
}
