//! Output control for changelog generation

use std::collections::BTreeSet;
use std::fmt;

use crate::schema::types::{Column, ForeignKey, Index, PrimaryKey, Table};

/// Which side of the comparison an object was found on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// Only in the reference schema
    Missing,
    /// Only in the live database
    Unexpected,
    /// On both sides with different definitions
    Changed,
}

/// A diff entry as seen by an [`ObjectChangeFilter`]
#[derive(Debug, Clone, Copy)]
pub enum DiffObject<'a> {
    Table(&'a Table),
    Column { table: &'a str, column: &'a Column },
    PrimaryKey { table: &'a str, primary_key: &'a PrimaryKey },
    Index { table: &'a str, index: &'a Index },
    ForeignKey { table: &'a str, foreign_key: &'a ForeignKey },
}

impl<'a> DiffObject<'a> {
    /// Every table the object touches
    pub fn table_names(&self) -> Vec<&'a str> {
        match *self {
            DiffObject::Table(table) => vec![table.name.as_str()],
            DiffObject::Column { table, .. }
            | DiffObject::PrimaryKey { table, .. }
            | DiffObject::Index { table, .. } => vec![table],
            DiffObject::ForeignKey { table, foreign_key } => {
                vec![table, foreign_key.ref_table.as_str()]
            }
        }
    }
}

/// Decides which diff entries make it into the changelog
pub trait ObjectChangeFilter: Send + Sync {
    fn include(&self, kind: DiffKind, object: &DiffObject<'_>) -> bool;
}

/// Suppresses every diff entry that touches one of the given tables
///
/// Table names match ASCII case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct TableNameFilter {
    tables: BTreeSet<String>,
}

impl TableNameFilter {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(|t| t.into().to_ascii_lowercase()).collect(),
        }
    }

    pub fn is_ignored(&self, table: &str) -> bool {
        self.tables.contains(&table.to_ascii_lowercase())
    }
}

impl ObjectChangeFilter for TableNameFilter {
    fn include(&self, _kind: DiffKind, object: &DiffObject<'_>) -> bool {
        !object
            .table_names()
            .into_iter()
            .any(|table| self.is_ignored(table))
    }
}

/// Formatting flags and filtering applied while generating a changelog
#[derive(Default)]
pub struct DiffOutputControl {
    include_schema: bool,
    object_change_filter: Option<Box<dyn ObjectChangeFilter>>,
}

impl DiffOutputControl {
    pub fn new(include_schema: bool) -> Self {
        Self {
            include_schema,
            object_change_filter: None,
        }
    }

    pub fn set_object_change_filter(&mut self, filter: impl ObjectChangeFilter + 'static) {
        self.object_change_filter = Some(Box::new(filter));
    }

    pub fn with_object_change_filter(mut self, filter: impl ObjectChangeFilter + 'static) -> Self {
        self.set_object_change_filter(filter);
        self
    }

    /// Whether generated changes carry the schema name
    pub fn include_schema(&self) -> bool {
        self.include_schema
    }

    pub fn should_output(&self, kind: DiffKind, object: &DiffObject<'_>) -> bool {
        self.object_change_filter
            .as_ref()
            .map_or(true, |filter| filter.include(kind, object))
    }
}

impl fmt::Debug for DiffOutputControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffOutputControl")
            .field("include_schema", &self.include_schema)
            .field("has_filter", &self.object_change_filter.is_some())
            .finish()
    }
}
