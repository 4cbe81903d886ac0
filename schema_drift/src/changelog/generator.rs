//! Changelog generator
//!
//! This module turns a [`DiffResult`] into an ordered [`ChangeLog`].

use chrono::Local;

use crate::changelog::filter::{DiffKind, DiffObject, DiffOutputControl};
use crate::changelog::{
    default_author, id_root, AddColumn, AddDefaultValue, AddForeignKeyConstraint, AddPrimaryKey,
    Change, ChangeColumn, ChangeLog, ChangeSet, ColumnConstraints, CreateIndex, CreateTable,
    DropColumn, DropDefaultValue, DropForeignKeyConstraint, DropIndex, DropPrimaryKey, DropTable,
    ModifyDataType, NotNullConstraint,
};
use crate::schema::diff::{ColumnDifference, DiffResult};
use crate::schema::types::{Column, PrimaryKey, Table};

/// Generates change sets from a diff
///
/// Creations come first (tables, columns, column modifications, primary
/// keys, indexes, foreign keys), drops follow in reverse dependency order.
/// Every change gets its own change set numbered from 1 under the id root.
pub struct DiffToChangeLog<'a> {
    diff: &'a DiffResult,
    control: &'a DiffOutputControl,
    id_root: String,
    author: String,
}

impl<'a> DiffToChangeLog<'a> {
    pub fn new(diff: &'a DiffResult, control: &'a DiffOutputControl) -> Self {
        Self {
            diff,
            control,
            id_root: id_root(Local::now().date_naive()),
            author: default_author(),
        }
    }

    pub fn with_id_root(mut self, id_root: impl Into<String>) -> Self {
        self.id_root = id_root.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn id_root(&self) -> &str {
        &self.id_root
    }

    /// Generate the changelog for the diff
    pub fn generate_change_log(&self) -> ChangeLog {
        let mut changes = Vec::new();

        self.missing_tables(&mut changes);
        self.missing_columns(&mut changes);
        self.changed_columns(&mut changes);
        self.missing_primary_keys(&mut changes);
        self.missing_indexes(&mut changes);
        self.missing_foreign_keys(&mut changes);
        self.unexpected_foreign_keys(&mut changes);
        self.unexpected_indexes(&mut changes);
        self.unexpected_primary_keys(&mut changes);
        self.unexpected_columns(&mut changes);
        self.unexpected_tables(&mut changes);

        let change_sets = changes
            .into_iter()
            .enumerate()
            .map(|(i, change)| ChangeSet {
                id: format!("{}-{}", self.id_root, i + 1),
                author: self.author.clone(),
                changes: vec![change],
            })
            .collect();

        ChangeLog::new(change_sets)
    }

    fn schema_name(&self) -> Option<String> {
        if self.control.include_schema() {
            self.diff.comparison_schema.clone()
        } else {
            None
        }
    }

    fn missing_tables(&self, changes: &mut Vec<Change>) {
        for table in &self.diff.missing_tables {
            if !self.control.should_output(DiffKind::Missing, &DiffObject::Table(table)) {
                continue;
            }

            changes.push(Change::CreateTable(CreateTable {
                schema_name: self.schema_name(),
                table_name: table.name.clone(),
                remarks: table.comment.clone(),
                columns: table
                    .columns
                    .iter()
                    .map(|column| table_column(table, column))
                    .collect(),
            }));
        }
    }

    fn missing_columns(&self, changes: &mut Vec<Change>) {
        for scoped in &self.diff.missing_columns {
            let object = DiffObject::Column {
                table: &scoped.table,
                column: &scoped.object,
            };
            if !self.control.should_output(DiffKind::Missing, &object) {
                continue;
            }

            changes.push(Change::AddColumn(AddColumn {
                schema_name: self.schema_name(),
                table_name: scoped.table.clone(),
                columns: vec![column_definition(&scoped.object, None)],
            }));
        }
    }

    fn changed_columns(&self, changes: &mut Vec<Change>) {
        for change in &self.diff.changed_columns {
            let object = DiffObject::Column {
                table: &change.table,
                column: &change.reference,
            };
            if !self.control.should_output(DiffKind::Changed, &object) {
                continue;
            }

            let column = &change.reference;
            for difference in &change.differences {
                let generated = match difference {
                    ColumnDifference::DataType => Change::ModifyDataType(ModifyDataType {
                        schema_name: self.schema_name(),
                        table_name: change.table.clone(),
                        column_name: column.name.clone(),
                        new_data_type: column.data_type.clone(),
                    }),
                    ColumnDifference::Nullable => {
                        let body = NotNullConstraint {
                            schema_name: self.schema_name(),
                            table_name: change.table.clone(),
                            column_name: column.name.clone(),
                            column_data_type: column.data_type.clone(),
                        };
                        if column.nullable {
                            Change::DropNotNullConstraint(body)
                        } else {
                            Change::AddNotNullConstraint(body)
                        }
                    }
                    ColumnDifference::Default => match &column.default {
                        Some(default) => Change::AddDefaultValue(AddDefaultValue {
                            schema_name: self.schema_name(),
                            table_name: change.table.clone(),
                            column_name: column.name.clone(),
                            column_data_type: column.data_type.clone(),
                            default_value: default.clone(),
                        }),
                        None => Change::DropDefaultValue(DropDefaultValue {
                            schema_name: self.schema_name(),
                            table_name: change.table.clone(),
                            column_name: column.name.clone(),
                            column_data_type: change.actual.data_type.clone(),
                        }),
                    },
                };
                changes.push(generated);
            }
        }
    }

    fn missing_primary_keys(&self, changes: &mut Vec<Change>) {
        for scoped in &self.diff.missing_primary_keys {
            let object = DiffObject::PrimaryKey {
                table: &scoped.table,
                primary_key: &scoped.object,
            };
            if !self.control.should_output(DiffKind::Missing, &object) {
                continue;
            }

            changes.push(Change::AddPrimaryKey(AddPrimaryKey {
                schema_name: self.schema_name(),
                table_name: scoped.table.clone(),
                column_names: scoped.object.columns.join(", "),
                constraint_name: scoped.object.name.clone(),
            }));
        }
    }

    fn missing_indexes(&self, changes: &mut Vec<Change>) {
        for scoped in &self.diff.missing_indexes {
            let object = DiffObject::Index {
                table: &scoped.table,
                index: &scoped.object,
            };
            if !self.control.should_output(DiffKind::Missing, &object) {
                continue;
            }

            changes.push(Change::CreateIndex(CreateIndex {
                schema_name: self.schema_name(),
                table_name: scoped.table.clone(),
                index_name: scoped.object.name.clone(),
                unique: scoped.object.is_unique,
                columns: scoped
                    .object
                    .columns
                    .iter()
                    .map(|name| ChangeColumn {
                        name: name.clone(),
                        ..ChangeColumn::default()
                    })
                    .collect(),
            }));
        }
    }

    fn missing_foreign_keys(&self, changes: &mut Vec<Change>) {
        for scoped in &self.diff.missing_foreign_keys {
            let object = DiffObject::ForeignKey {
                table: &scoped.table,
                foreign_key: &scoped.object,
            };
            if !self.control.should_output(DiffKind::Missing, &object) {
                continue;
            }

            let fk = &scoped.object;
            changes.push(Change::AddForeignKeyConstraint(AddForeignKeyConstraint {
                base_table_schema_name: self.schema_name(),
                base_table_name: scoped.table.clone(),
                base_column_names: fk.columns.join(", "),
                constraint_name: fk.name.clone(),
                referenced_table_name: fk.ref_table.clone(),
                referenced_column_names: fk.ref_columns.join(", "),
                on_delete: fk.on_delete.clone(),
                on_update: fk.on_update.clone(),
            }));
        }
    }

    fn unexpected_foreign_keys(&self, changes: &mut Vec<Change>) {
        for scoped in &self.diff.unexpected_foreign_keys {
            let object = DiffObject::ForeignKey {
                table: &scoped.table,
                foreign_key: &scoped.object,
            };
            if !self.control.should_output(DiffKind::Unexpected, &object) {
                continue;
            }

            changes.push(Change::DropForeignKeyConstraint(DropForeignKeyConstraint {
                base_table_schema_name: self.schema_name(),
                base_table_name: scoped.table.clone(),
                constraint_name: scoped.object.name.clone(),
            }));
        }
    }

    fn unexpected_indexes(&self, changes: &mut Vec<Change>) {
        for scoped in &self.diff.unexpected_indexes {
            let object = DiffObject::Index {
                table: &scoped.table,
                index: &scoped.object,
            };
            if !self.control.should_output(DiffKind::Unexpected, &object) {
                continue;
            }

            changes.push(Change::DropIndex(DropIndex {
                schema_name: self.schema_name(),
                table_name: scoped.table.clone(),
                index_name: scoped.object.name.clone(),
            }));
        }
    }

    fn unexpected_primary_keys(&self, changes: &mut Vec<Change>) {
        for scoped in &self.diff.unexpected_primary_keys {
            let object = DiffObject::PrimaryKey {
                table: &scoped.table,
                primary_key: &scoped.object,
            };
            if !self.control.should_output(DiffKind::Unexpected, &object) {
                continue;
            }

            changes.push(Change::DropPrimaryKey(DropPrimaryKey {
                schema_name: self.schema_name(),
                table_name: scoped.table.clone(),
                constraint_name: scoped.object.name.clone(),
            }));
        }
    }

    fn unexpected_columns(&self, changes: &mut Vec<Change>) {
        for scoped in &self.diff.unexpected_columns {
            let object = DiffObject::Column {
                table: &scoped.table,
                column: &scoped.object,
            };
            if !self.control.should_output(DiffKind::Unexpected, &object) {
                continue;
            }

            changes.push(Change::DropColumn(DropColumn {
                schema_name: self.schema_name(),
                table_name: scoped.table.clone(),
                column_name: scoped.object.name.clone(),
            }));
        }
    }

    fn unexpected_tables(&self, changes: &mut Vec<Change>) {
        for table in &self.diff.unexpected_tables {
            if !self.control.should_output(DiffKind::Unexpected, &DiffObject::Table(table)) {
                continue;
            }

            changes.push(Change::DropTable(DropTable {
                schema_name: self.schema_name(),
                table_name: table.name.clone(),
            }));
        }
    }
}

/// Column of a table being created, primary key folded into its constraints
fn table_column(table: &Table, column: &Column) -> ChangeColumn {
    let primary_key = table
        .primary_key
        .as_ref()
        .filter(|pk| pk.columns.iter().any(|c| c.eq_ignore_ascii_case(&column.name)));

    column_definition(column, primary_key)
}

fn column_definition(column: &Column, primary_key: Option<&PrimaryKey>) -> ChangeColumn {
    let constraints = if primary_key.is_some() || !column.nullable {
        Some(ColumnConstraints {
            nullable: if column.nullable { None } else { Some(false) },
            primary_key: primary_key.map(|_| true),
            primary_key_name: primary_key.and_then(|pk| pk.name.clone()),
        })
    } else {
        None
    };

    ChangeColumn {
        name: column.name.clone(),
        data_type: Some(column.data_type.clone()),
        auto_increment: column.auto_increment.then_some(true),
        default_value: column.default.clone(),
        remarks: column.comment.clone(),
        constraints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::TableNameFilter;
    use crate::schema::diff::compare;
    use crate::schema::types::{ForeignKey, SchemaSnapshot};
    use pretty_assertions::assert_eq;

    fn reference() -> SchemaSnapshot {
        let mut b = Table::new("b")
            .with_column(Column::new("id", "BIGINT"))
            .with_column(Column::new("a_id", "BIGINT").nullable(true))
            .with_primary_key(PrimaryKey {
                name: Some("pk_b".to_string()),
                columns: vec!["id".to_string()],
            });
        b.add_foreign_key(ForeignKey {
            name: "fk_b_a_id".to_string(),
            columns: vec!["a_id".to_string()],
            ref_table: "a".to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: None,
            on_update: None,
        });

        SchemaSnapshot::new(None)
            .with_table(
                Table::new("a")
                    .with_column(Column::new("id", "BIGINT"))
                    .with_column(Column::new("name", "VARCHAR(255)").nullable(true)),
            )
            .with_table(b)
    }

    fn actual() -> SchemaSnapshot {
        SchemaSnapshot::new(Some("public".to_string())).with_table(
            Table::new("a")
                .with_column(Column::new("id", "BIGINT"))
                .with_column(Column::new("name", "VARCHAR(255)").nullable(true))
                .with_column(Column::new("obsolete", "TEXT").nullable(true)),
        )
    }

    #[test]
    fn test_change_sets_are_ordered_and_numbered() {
        let diff = compare(&reference(), &actual()).expect("diff");
        let control = DiffOutputControl::new(false);
        let change_log = DiffToChangeLog::new(&diff, &control)
            .with_id_root("20240101-01")
            .with_author("tester")
            .generate_change_log();

        let ids: Vec<&str> = change_log.change_sets().iter().map(|cs| cs.id.as_str()).collect();
        assert_eq!(ids, vec!["20240101-01-1", "20240101-01-2", "20240101-01-3"]);

        let changes: Vec<&Change> = change_log
            .change_sets()
            .iter()
            .flat_map(|cs| cs.changes.iter())
            .collect();
        assert!(matches!(changes[0], Change::CreateTable(t) if t.table_name == "b"));
        assert!(matches!(changes[1], Change::AddForeignKeyConstraint(fk) if fk.referenced_table_name == "a"));
        assert!(matches!(changes[2], Change::DropColumn(c) if c.column_name == "obsolete"));
        assert!(change_log.change_sets().iter().all(|cs| cs.author == "tester"));
    }

    #[test]
    fn test_create_table_folds_primary_key_into_columns() {
        let diff = compare(&reference(), &actual()).expect("diff");
        let control = DiffOutputControl::new(false);
        let change_log = DiffToChangeLog::new(&diff, &control).generate_change_log();

        let Change::CreateTable(create) = &change_log.change_sets()[0].changes[0] else {
            panic!("expected createTable first");
        };
        assert_eq!(
            create.columns[0].constraints,
            Some(ColumnConstraints {
                nullable: Some(false),
                primary_key: Some(true),
                primary_key_name: Some("pk_b".to_string()),
            })
        );
        assert_eq!(create.columns[1].constraints, None);
        assert_eq!(create.schema_name, None);
    }

    #[test]
    fn test_filter_suppresses_ignored_tables() {
        let diff = compare(&reference(), &actual()).expect("diff");
        let control = DiffOutputControl::new(false).with_object_change_filter(TableNameFilter::new(["B"]));
        let change_log = DiffToChangeLog::new(&diff, &control).generate_change_log();

        assert_eq!(change_log.len(), 1);
        assert_eq!(change_log.change_sets()[0].id.rsplit('-').next(), Some("1"));
        assert!(matches!(&change_log.change_sets()[0].changes[0], Change::DropColumn(_)));
    }

    #[test]
    fn test_include_schema_uses_comparison_schema() {
        let diff = compare(&reference(), &actual()).expect("diff");
        let control = DiffOutputControl::new(true);
        let change_log = DiffToChangeLog::new(&diff, &control).generate_change_log();

        let Change::CreateTable(create) = &change_log.change_sets()[0].changes[0] else {
            panic!("expected createTable first");
        };
        assert_eq!(create.schema_name.as_deref(), Some("public"));
    }

    #[test]
    fn test_column_modifications() {
        let reference = SchemaSnapshot::new(None).with_table(
            Table::new("t")
                .with_column(Column::new("code", "VARCHAR(32)"))
                .with_column(Column::new("state", "TEXT").nullable(true).default("'new'")),
        );
        let actual = SchemaSnapshot::new(None).with_table(
            Table::new("t")
                .with_column(Column::new("code", "VARCHAR(16)").nullable(true))
                .with_column(Column::new("state", "TEXT").nullable(true)),
        );

        let diff = compare(&reference, &actual).expect("diff");
        let control = DiffOutputControl::new(false);
        let change_log = DiffToChangeLog::new(&diff, &control).generate_change_log();

        let changes: Vec<&Change> = change_log
            .change_sets()
            .iter()
            .flat_map(|cs| cs.changes.iter())
            .collect();
        assert_eq!(changes.len(), 3);
        assert!(matches!(changes[0], Change::ModifyDataType(m) if m.new_data_type == "VARCHAR(32)"));
        assert!(matches!(changes[1], Change::AddNotNullConstraint(n) if n.column_name == "code"));
        assert!(matches!(changes[2], Change::AddDefaultValue(d) if d.default_value == "'new'"));
    }
}
