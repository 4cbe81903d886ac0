//! Changelog model
//!
//! A [`ChangeLog`] is the ordered list of change sets that would bring the
//! live database in line with the reference schema. The shape of every change
//! follows the Liquibase changelog vocabulary so the output can be fed to
//! existing tooling.

pub mod filter;
pub mod generator;
pub mod serializer;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use filter::{DiffKind, DiffObject, DiffOutputControl, ObjectChangeFilter, TableNameFilter};
pub use generator::DiffToChangeLog;
pub use serializer::{
    ChangeLogSerializer, JsonChangeLogSerializer, XmlChangeLogSerializer, YamlChangeLogSerializer,
};

/// Root for change set identifiers generated on `date`
///
/// The suffix is fixed: every run on the same day shares a root, change sets
/// are told apart by the sequence number appended to it.
pub fn id_root(date: NaiveDate) -> String {
    date.format("%Y%m%d-01").to_string()
}

/// Author recorded on generated change sets
pub fn default_author() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "schema_drift".to_string());
    format!("{} (generated)", user)
}

/// Output format of a serialized changelog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChangeLogFormat {
    #[default]
    Xml,
    Yaml,
    Json,
}

impl ChangeLogFormat {
    pub fn serializer(&self) -> Box<dyn ChangeLogSerializer> {
        match self {
            ChangeLogFormat::Xml => Box::new(XmlChangeLogSerializer),
            ChangeLogFormat::Yaml => Box::new(YamlChangeLogSerializer),
            ChangeLogFormat::Json => Box::new(JsonChangeLogSerializer),
        }
    }
}

/// Ordered sequence of change sets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeLog {
    change_sets: Vec<ChangeSet>,
}

impl ChangeLog {
    pub fn new(change_sets: Vec<ChangeSet>) -> Self {
        Self { change_sets }
    }

    pub fn change_sets(&self) -> &[ChangeSet] {
        &self.change_sets
    }

    pub fn is_empty(&self) -> bool {
        self.change_sets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.change_sets.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSet {
    pub id: String,
    pub author: String,
    pub changes: Vec<Change>,
}

/// A single change operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Change {
    CreateTable(CreateTable),
    DropTable(DropTable),
    AddColumn(AddColumn),
    DropColumn(DropColumn),
    ModifyDataType(ModifyDataType),
    AddNotNullConstraint(NotNullConstraint),
    DropNotNullConstraint(NotNullConstraint),
    AddDefaultValue(AddDefaultValue),
    DropDefaultValue(DropDefaultValue),
    AddPrimaryKey(AddPrimaryKey),
    DropPrimaryKey(DropPrimaryKey),
    CreateIndex(CreateIndex),
    DropIndex(DropIndex),
    AddForeignKeyConstraint(AddForeignKeyConstraint),
    DropForeignKeyConstraint(DropForeignKeyConstraint),
}

impl Change {
    /// Name of the table the change applies to
    pub fn table_name(&self) -> &str {
        match self {
            Change::CreateTable(c) => &c.table_name,
            Change::DropTable(c) => &c.table_name,
            Change::AddColumn(c) => &c.table_name,
            Change::DropColumn(c) => &c.table_name,
            Change::ModifyDataType(c) => &c.table_name,
            Change::AddNotNullConstraint(c) | Change::DropNotNullConstraint(c) => &c.table_name,
            Change::AddDefaultValue(c) => &c.table_name,
            Change::DropDefaultValue(c) => &c.table_name,
            Change::AddPrimaryKey(c) => &c.table_name,
            Change::DropPrimaryKey(c) => &c.table_name,
            Change::CreateIndex(c) => &c.table_name,
            Change::DropIndex(c) => &c.table_name,
            Change::AddForeignKeyConstraint(c) => &c.base_table_name,
            Change::DropForeignKeyConstraint(c) => &c.base_table_name,
        }
    }
}

/// Serialize column lists as `[{column: {...}}]`
fn wrap_columns<S>(columns: &[ChangeColumn], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    #[derive(Serialize)]
    struct Wrapped<'a> {
        column: &'a ChangeColumn,
    }

    serializer.collect_seq(columns.iter().map(|column| Wrapped { column }))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeColumn {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<ColumnConstraints>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(serialize_with = "wrap_columns")]
    pub columns: Vec<ChangeColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddColumn {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    #[serde(serialize_with = "wrap_columns")]
    pub columns: Vec<ChangeColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropColumn {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    pub column_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyDataType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    pub column_name: String,
    pub new_data_type: String,
}

/// Body shared by `addNotNullConstraint` and `dropNotNullConstraint`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotNullConstraint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    pub column_name: String,
    pub column_data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDefaultValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    pub column_name: String,
    pub column_data_type: String,
    pub default_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropDefaultValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    pub column_name: String,
    pub column_data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPrimaryKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    pub column_names: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropPrimaryKey {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIndex {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    pub index_name: String,
    pub unique: bool,
    #[serde(serialize_with = "wrap_columns")]
    pub columns: Vec<ChangeColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropIndex {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub table_name: String,
    pub index_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddForeignKeyConstraint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_table_schema_name: Option<String>,
    pub base_table_name: String,
    pub base_column_names: String,
    pub constraint_name: String,
    pub referenced_table_name: String,
    pub referenced_column_names: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropForeignKeyConstraint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_table_schema_name: Option<String>,
    pub base_table_name: String,
    pub constraint_name: String,
}
