//! Schema difference calculator
//!
//! Compares a reference snapshot (what the entity mapping expects) with a
//! comparison snapshot (what the live database has). Objects only present on
//! the reference side are "missing", objects only present on the comparison
//! side are "unexpected".

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::schema::types::{Column, ForeignKey, Index, PrimaryKey, SchemaSnapshot, Table};

static TYPE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([a-z][a-z0-9_ ]*?)\s*(?:\(([^)]*)\))?\s*(\[\])?$").expect("valid type pattern")
});

static CAST_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)::[a-z_ ]+(\(\d+(\s*,\s*\d+)?\))?(\[\])?$").expect("valid cast pattern")
});

/// An object that lives inside a table
#[derive(Debug, Clone, PartialEq)]
pub struct TableScoped<T> {
    pub table: String,
    pub object: T,
}

impl<T> TableScoped<T> {
    fn new(table: &str, object: T) -> Self {
        Self {
            table: table.to_string(),
            object,
        }
    }
}

/// Attribute of a column that differs between the two sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDifference {
    DataType,
    Nullable,
    Default,
}

/// Represents a column present on both sides with differing definitions
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnChange {
    pub table: String,
    pub reference: Column,
    pub actual: Column,
    pub differences: Vec<ColumnDifference>,
}

/// Structured set of differences between two snapshots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    pub reference_schema: Option<String>,
    pub comparison_schema: Option<String>,
    pub missing_tables: Vec<Table>,
    pub unexpected_tables: Vec<Table>,
    pub missing_columns: Vec<TableScoped<Column>>,
    pub unexpected_columns: Vec<TableScoped<Column>>,
    pub changed_columns: Vec<ColumnChange>,
    pub missing_primary_keys: Vec<TableScoped<PrimaryKey>>,
    pub unexpected_primary_keys: Vec<TableScoped<PrimaryKey>>,
    pub missing_indexes: Vec<TableScoped<Index>>,
    pub unexpected_indexes: Vec<TableScoped<Index>>,
    pub missing_foreign_keys: Vec<TableScoped<ForeignKey>>,
    pub unexpected_foreign_keys: Vec<TableScoped<ForeignKey>>,
}

impl DiffResult {
    /// Check if the diff is empty (both sides match)
    pub fn is_empty(&self) -> bool {
        self.missing_tables.is_empty()
            && self.unexpected_tables.is_empty()
            && self.missing_columns.is_empty()
            && self.unexpected_columns.is_empty()
            && self.changed_columns.is_empty()
            && self.missing_primary_keys.is_empty()
            && self.unexpected_primary_keys.is_empty()
            && self.missing_indexes.is_empty()
            && self.unexpected_indexes.is_empty()
            && self.missing_foreign_keys.is_empty()
            && self.unexpected_foreign_keys.is_empty()
    }
}

/// Compute the differences between a reference and a comparison snapshot
pub fn compare(reference: &SchemaSnapshot, comparison: &SchemaSnapshot) -> Result<DiffResult> {
    validate(reference, "reference")?;
    validate(comparison, "comparison")?;

    let mut diff = DiffResult {
        reference_schema: reference.schema_name.clone(),
        comparison_schema: comparison.schema_name.clone(),
        ..DiffResult::default()
    };

    for reference_table in reference.tables.values() {
        match comparison.find_table(&reference_table.name) {
            Some(actual_table) => compare_tables(reference_table, actual_table, &mut diff),
            None => {
                // Constraints of a new table are reported on their own so they
                // can be created once every table exists
                for index in &reference_table.indexes {
                    diff.missing_indexes
                        .push(TableScoped::new(&reference_table.name, index.clone()));
                }
                for fk in &reference_table.foreign_keys {
                    diff.missing_foreign_keys
                        .push(TableScoped::new(&reference_table.name, fk.clone()));
                }
                diff.missing_tables.push(reference_table.clone());
            }
        }
    }

    diff.unexpected_tables = comparison
        .tables
        .values()
        .filter(|table| reference.find_table(&table.name).is_none())
        .cloned()
        .collect();

    Ok(diff)
}

/// Reject snapshots whose identifiers collide once case is ignored
fn validate(snapshot: &SchemaSnapshot, side: &str) -> Result<()> {
    let mut table_names = HashSet::new();
    for table in snapshot.tables.values() {
        if !table_names.insert(table.name.to_ascii_lowercase()) {
            return Err(Error::DiffFailure(format!(
                "{} snapshot contains table {} more than once",
                side, table.name
            )));
        }

        let mut column_names = HashSet::new();
        for column in &table.columns {
            if !column_names.insert(column.name.to_ascii_lowercase()) {
                return Err(Error::DiffFailure(format!(
                    "{} snapshot contains column {}.{} more than once",
                    side, table.name, column.name
                )));
            }
        }
    }

    Ok(())
}

fn compare_tables(reference: &Table, actual: &Table, diff: &mut DiffResult) {
    let table_name = reference.name.as_str();

    for reference_column in &reference.columns {
        match actual.find_column(&reference_column.name) {
            Some(actual_column) => {
                let differences = column_differences(reference_column, actual_column);
                if !differences.is_empty() {
                    diff.changed_columns.push(ColumnChange {
                        table: table_name.to_string(),
                        reference: reference_column.clone(),
                        actual: actual_column.clone(),
                        differences,
                    });
                }
            }
            None => diff
                .missing_columns
                .push(TableScoped::new(table_name, reference_column.clone())),
        }
    }

    for actual_column in &actual.columns {
        if reference.find_column(&actual_column.name).is_none() {
            diff.unexpected_columns
                .push(TableScoped::new(&actual.name, actual_column.clone()));
        }
    }

    match (&reference.primary_key, &actual.primary_key) {
        (Some(expected), Some(found)) if !same_columns(&expected.columns, &found.columns) => {
            diff.unexpected_primary_keys
                .push(TableScoped::new(&actual.name, found.clone()));
            diff.missing_primary_keys
                .push(TableScoped::new(table_name, expected.clone()));
        }
        (Some(expected), None) => diff
            .missing_primary_keys
            .push(TableScoped::new(table_name, expected.clone())),
        (None, Some(found)) => diff
            .unexpected_primary_keys
            .push(TableScoped::new(&actual.name, found.clone())),
        _ => {}
    }

    for index in &reference.indexes {
        if !actual.indexes.iter().any(|other| same_index(index, other)) {
            diff.missing_indexes
                .push(TableScoped::new(table_name, index.clone()));
        }
    }

    for index in &actual.indexes {
        if backs_primary_key(index, actual) {
            continue;
        }
        if !reference.indexes.iter().any(|other| same_index(index, other)) {
            diff.unexpected_indexes
                .push(TableScoped::new(&actual.name, index.clone()));
        }
    }

    for fk in &reference.foreign_keys {
        if !actual.foreign_keys.iter().any(|other| same_foreign_key(fk, other)) {
            diff.missing_foreign_keys
                .push(TableScoped::new(table_name, fk.clone()));
        }
    }

    for fk in &actual.foreign_keys {
        if !reference.foreign_keys.iter().any(|other| same_foreign_key(fk, other)) {
            diff.unexpected_foreign_keys
                .push(TableScoped::new(&actual.name, fk.clone()));
        }
    }
}

/// List the attributes that differ between two definitions of one column
fn column_differences(reference: &Column, actual: &Column) -> Vec<ColumnDifference> {
    let mut differences = Vec::new();

    if !same_data_type(&reference.data_type, &actual.data_type) {
        differences.push(ColumnDifference::DataType);
    }

    if reference.nullable != actual.nullable {
        differences.push(ColumnDifference::Nullable);
    }

    let reference_default = reference.default.as_deref().map(normalize_default);
    let actual_default = actual.default.as_deref().map(normalize_default);
    if reference_default != actual_default {
        differences.push(ColumnDifference::Default);
    }

    differences
}

fn same_columns(left: &[String], right: &[String]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(l, r)| l.eq_ignore_ascii_case(r))
}

fn same_index(left: &Index, right: &Index) -> bool {
    left.is_unique == right.is_unique && same_columns(&left.columns, &right.columns)
}

fn same_foreign_key(left: &ForeignKey, right: &ForeignKey) -> bool {
    left.ref_table.eq_ignore_ascii_case(&right.ref_table)
        && same_columns(&left.columns, &right.columns)
        && same_columns(&left.ref_columns, &right.ref_columns)
}

/// Unique indexes some databases report for the primary key itself
fn backs_primary_key(index: &Index, table: &Table) -> bool {
    index.is_unique
        && table
            .primary_key
            .as_ref()
            .map_or(false, |pk| same_columns(&pk.columns, &index.columns))
}

/// Compare two data types after resolving common aliases
///
/// When only one side carries a length or precision the base types decide.
pub fn same_data_type(left: &str, right: &str) -> bool {
    let (left_base, left_args) = normalize_type(left);
    let (right_base, right_args) = normalize_type(right);

    if left_base != right_base {
        return false;
    }

    match (left_args, right_args) {
        (Some(l), Some(r)) => l == r,
        _ => true,
    }
}

/// Split a data type into its canonical base name and its argument list
fn normalize_type(data_type: &str) -> (String, Option<String>) {
    let lowered = data_type
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();

    let Some(captures) = TYPE_PATTERN.captures(&lowered) else {
        return (lowered, None);
    };

    let base = captures.get(1).map_or("", |m| m.as_str()).trim();
    let mut canonical = canonical_type(base).to_string();
    if captures.get(3).is_some() {
        canonical.push_str("[]");
    }

    let args = captures
        .get(2)
        .map(|m| m.as_str().replace(' ', ""))
        .filter(|args| !args.is_empty());

    (canonical, args)
}

fn canonical_type(base: &str) -> &str {
    match base {
        "character varying" | "varchar" | "varchar2" => "varchar",
        "character" | "char" | "bpchar" => "char",
        "int" | "int4" | "integer" | "serial" | "serial4" => "integer",
        "int8" | "bigint" | "bigserial" | "serial8" => "bigint",
        "int2" | "smallint" | "smallserial" => "smallint",
        "bool" | "boolean" => "boolean",
        "float8" | "double precision" | "double" => "double precision",
        "float4" | "real" => "real",
        "decimal" | "numeric" => "numeric",
        "timestamptz" | "timestamp with time zone" => "timestamptz",
        "timestamp" | "timestamp without time zone" => "timestamp",
        "timetz" | "time with time zone" => "timetz",
        "time" | "time without time zone" => "time",
        other => other,
    }
}

/// Normalize a default expression so cosmetic differences compare equal
fn normalize_default(default: &str) -> String {
    let mut value = default.trim().to_string();

    loop {
        let stripped = CAST_SUFFIX.replace(&value, "").trim().to_string();
        let unwrapped = if stripped.starts_with('(') && stripped.ends_with(')') {
            stripped[1..stripped.len() - 1].trim().to_string()
        } else {
            stripped
        };

        if unwrapped == value {
            break;
        }
        value = unwrapped;
    }

    // String literals compare exactly, bare expressions ignore case
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }

    value.to_ascii_lowercase()
}
