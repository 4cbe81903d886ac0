//! Database schema analyzer
//!
//! This module captures [`SchemaSnapshot`]s from live databases.

use async_trait::async_trait;
use indexmap::IndexMap;
use sqlx::{FromRow, MySqlConnection, PgConnection, Row, SqliteConnection};

use crate::db::connection::{Connection, Database};
use crate::error::{Error, Result};
use crate::schema::types::{Column, ForeignKey, Index, PrimaryKey, SchemaSnapshot, Table};

/// Anything a schema snapshot can be taken from
#[async_trait]
pub trait SnapshotSource: Send {
    async fn snapshot(&mut self) -> Result<SchemaSnapshot>;
}

/// A pre-built snapshot is its own source
#[async_trait]
impl SnapshotSource for SchemaSnapshot {
    async fn snapshot(&mut self) -> Result<SchemaSnapshot> {
        Ok(self.clone())
    }
}

#[async_trait]
impl<'c> SnapshotSource for Database<'c> {
    async fn snapshot(&mut self) -> Result<SchemaSnapshot> {
        let schema = self.default_schema_name().map(str::to_string);
        let snapshot = match &mut *self.connection {
            Connection::Postgres(conn) => {
                PostgresAnalyzer { conn: &mut **conn }
                    .analyze_schema(schema.as_deref())
                    .await?
            }
            Connection::MySql(conn) => {
                MySqlAnalyzer { conn: &mut **conn }
                    .analyze_schema(schema.as_deref())
                    .await?
            }
            Connection::Sqlite(conn) => {
                SqliteAnalyzer { conn: &mut **conn }
                    .analyze_schema(schema.as_deref())
                    .await?
            }
        };

        tracing::debug!(
            schema = snapshot.schema_name.as_deref().unwrap_or(""),
            tables = snapshot.tables.len(),
            "Captured database snapshot"
        );

        Ok(snapshot)
    }
}

/// Per-driver schema introspection
#[async_trait]
trait Analyzer: Send {
    /// Schema the connection currently resolves unqualified names in
    async fn current_schema(&mut self) -> Result<Option<String>>;

    /// Analyze table definitions
    async fn analyze_tables(&mut self, schema_name: Option<&str>) -> Result<Vec<Table>>;

    /// Analyze the database schema
    async fn analyze_schema(&mut self, schema_name: Option<&str>) -> Result<SchemaSnapshot> {
        let schema = match schema_name {
            Some(name) => Some(name.to_string()),
            None => self.current_schema().await?,
        };

        let mut snapshot = SchemaSnapshot::new(schema.clone());
        for table in self.analyze_tables(schema.as_deref()).await? {
            snapshot.add_table(table);
        }

        Ok(snapshot)
    }
}

#[derive(FromRow)]
struct PrimaryKeyRow {
    constraint_name: String,
    column_name: String,
}

#[derive(FromRow)]
struct IndexRow {
    index_name: String,
    column_name: String,
    is_unique: bool,
}

#[derive(FromRow)]
struct ForeignKeyRow {
    constraint_name: String,
    column_name: String,
    ref_table: String,
    ref_column: String,
    delete_rule: Option<String>,
    update_rule: Option<String>,
}

fn primary_key_from_rows(rows: Vec<PrimaryKeyRow>) -> Option<PrimaryKey> {
    let name = rows.first()?.constraint_name.clone();
    Some(PrimaryKey {
        name: Some(name),
        columns: rows.into_iter().map(|row| row.column_name).collect(),
    })
}

fn indexes_from_rows(rows: Vec<IndexRow>) -> Vec<Index> {
    let mut indexes: IndexMap<String, Index> = IndexMap::new();
    for row in rows {
        indexes
            .entry(row.index_name.clone())
            .or_insert_with(|| Index {
                name: row.index_name,
                columns: Vec::new(),
                is_unique: row.is_unique,
            })
            .columns
            .push(row.column_name);
    }

    indexes.into_values().collect()
}

fn foreign_keys_from_rows(rows: Vec<ForeignKeyRow>) -> Vec<ForeignKey> {
    let mut foreign_keys: IndexMap<String, ForeignKey> = IndexMap::new();
    for row in rows {
        let fk = foreign_keys
            .entry(row.constraint_name.clone())
            .or_insert_with(|| ForeignKey {
                name: row.constraint_name,
                columns: Vec::new(),
                ref_table: row.ref_table,
                ref_columns: Vec::new(),
                on_delete: row.delete_rule,
                on_update: row.update_rule,
            });
        fk.columns.push(row.column_name);
        fk.ref_columns.push(row.ref_column);
    }

    foreign_keys.into_values().collect()
}

#[derive(FromRow)]
struct PgColumnRow {
    column_name: String,
    data_type: String,
    udt_name: String,
    is_nullable: String,
    column_default: Option<String>,
    character_maximum_length: Option<i64>,
    numeric_precision: Option<i64>,
    numeric_scale: Option<i64>,
    is_identity: Option<String>,
}

impl PgColumnRow {
    fn into_column(self) -> Column {
        let data_type = match self.data_type.as_str() {
            "character varying" | "character" => match self.character_maximum_length {
                Some(length) if self.data_type == "character" => format!("char({})", length),
                Some(length) => format!("varchar({})", length),
                None => self.data_type.clone(),
            },
            "numeric" => match (self.numeric_precision, self.numeric_scale) {
                (Some(precision), Some(scale)) => format!("numeric({},{})", precision, scale),
                _ => self.data_type.clone(),
            },
            "USER-DEFINED" => self.udt_name.clone(),
            "ARRAY" => format!("{}[]", self.udt_name.trim_start_matches('_')),
            _ => self.data_type.clone(),
        };

        let sequence_default = self
            .column_default
            .as_deref()
            .map_or(false, |default| default.starts_with("nextval("));
        let auto_increment = sequence_default || self.is_identity.as_deref() == Some("YES");

        Column {
            name: self.column_name,
            data_type,
            nullable: self.is_nullable == "YES",
            default: if auto_increment { None } else { self.column_default },
            auto_increment,
            comment: None,
        }
    }
}

/// PostgreSQL schema analyzer
struct PostgresAnalyzer<'a> {
    conn: &'a mut PgConnection,
}

#[async_trait]
impl<'a> Analyzer for PostgresAnalyzer<'a> {
    async fn current_schema(&mut self) -> Result<Option<String>> {
        sqlx::query_scalar::<_, Option<String>>("SELECT current_schema()::text")
            .fetch_one(&mut *self.conn)
            .await
            .map_err(Error::snapshot)
    }

    async fn analyze_tables(&mut self, schema_name: Option<&str>) -> Result<Vec<Table>> {
        let schema = schema_name.unwrap_or("public");

        let sql = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let table_names = sqlx::query_scalar::<_, String>(sql)
            .bind(schema)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(Error::snapshot)?;

        let mut tables = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            let mut table = Table::new(&table_name);

            let sql = r#"
                SELECT
                    column_name::text AS column_name,
                    data_type::text AS data_type,
                    udt_name::text AS udt_name,
                    is_nullable::text AS is_nullable,
                    column_default::text AS column_default,
                    character_maximum_length::int8 AS character_maximum_length,
                    numeric_precision::int8 AS numeric_precision,
                    numeric_scale::int8 AS numeric_scale,
                    is_identity::text AS is_identity
                FROM information_schema.columns
                WHERE table_schema = $1 AND table_name = $2
                ORDER BY ordinal_position
            "#;

            let column_rows = sqlx::query_as::<_, PgColumnRow>(sql)
                .bind(schema)
                .bind(&table_name)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            for row in column_rows {
                table.add_column(row.into_column());
            }

            let sql = r#"
                SELECT
                    tc.constraint_name::text AS constraint_name,
                    kcu.column_name::text AS column_name
                FROM information_schema.table_constraints tc
                JOIN information_schema.key_column_usage kcu
                    ON tc.constraint_name = kcu.constraint_name
                    AND tc.table_schema = kcu.table_schema
                WHERE tc.constraint_type = 'PRIMARY KEY'
                    AND tc.table_schema = $1
                    AND tc.table_name = $2
                ORDER BY kcu.ordinal_position
            "#;

            let pk_rows = sqlx::query_as::<_, PrimaryKeyRow>(sql)
                .bind(schema)
                .bind(&table_name)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            table.primary_key = primary_key_from_rows(pk_rows);

            let sql = r#"
                SELECT
                    i.relname::text AS index_name,
                    a.attname::text AS column_name,
                    ix.indisunique AS is_unique
                FROM pg_index ix
                JOIN pg_class i ON i.oid = ix.indexrelid
                JOIN pg_class t ON t.oid = ix.indrelid
                JOIN pg_namespace n ON n.oid = t.relnamespace
                JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
                WHERE t.relname = $1
                    AND n.nspname = $2
                    AND NOT ix.indisprimary
                ORDER BY i.relname, array_position(ix.indkey::int2[], a.attnum)
            "#;

            let index_rows = sqlx::query_as::<_, IndexRow>(sql)
                .bind(&table_name)
                .bind(schema)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            table.indexes = indexes_from_rows(index_rows);

            let sql = r#"
                SELECT
                    con.conname::text AS constraint_name,
                    att.attname::text AS column_name,
                    ref_cls.relname::text AS ref_table,
                    ref_att.attname::text AS ref_column,
                    CASE con.confdeltype
                        WHEN 'c' THEN 'CASCADE' WHEN 'n' THEN 'SET NULL'
                        WHEN 'd' THEN 'SET DEFAULT' WHEN 'r' THEN 'RESTRICT'
                        ELSE 'NO ACTION' END AS delete_rule,
                    CASE con.confupdtype
                        WHEN 'c' THEN 'CASCADE' WHEN 'n' THEN 'SET NULL'
                        WHEN 'd' THEN 'SET DEFAULT' WHEN 'r' THEN 'RESTRICT'
                        ELSE 'NO ACTION' END AS update_rule
                FROM pg_constraint con
                JOIN pg_class cls ON cls.oid = con.conrelid
                JOIN pg_namespace nsp ON nsp.oid = cls.relnamespace
                JOIN pg_class ref_cls ON ref_cls.oid = con.confrelid
                CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
                    WITH ORDINALITY AS k(attnum, ref_attnum, ord)
                JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
                JOIN pg_attribute ref_att ON ref_att.attrelid = con.confrelid AND ref_att.attnum = k.ref_attnum
                WHERE con.contype = 'f' AND nsp.nspname = $1 AND cls.relname = $2
                ORDER BY con.conname, k.ord
            "#;

            let fk_rows = sqlx::query_as::<_, ForeignKeyRow>(sql)
                .bind(schema)
                .bind(&table_name)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            table.foreign_keys = foreign_keys_from_rows(fk_rows);

            tables.push(table);
        }

        Ok(tables)
    }
}

#[derive(FromRow)]
struct MySqlColumnRow {
    column_name: String,
    column_type: String,
    is_nullable: String,
    column_default: Option<String>,
    extra: Option<String>,
}

#[derive(FromRow)]
struct MySqlIndexRow {
    index_name: String,
    column_name: String,
    non_unique: i64,
}

/// MySQL schema analyzer
struct MySqlAnalyzer<'a> {
    conn: &'a mut MySqlConnection,
}

#[async_trait]
impl<'a> Analyzer for MySqlAnalyzer<'a> {
    async fn current_schema(&mut self) -> Result<Option<String>> {
        sqlx::query_scalar::<_, Option<String>>("SELECT CAST(DATABASE() AS CHAR)")
            .fetch_one(&mut *self.conn)
            .await
            .map_err(Error::snapshot)
    }

    async fn analyze_tables(&mut self, schema_name: Option<&str>) -> Result<Vec<Table>> {
        let Some(schema) = schema_name else {
            return Err(Error::SnapshotFailure(
                "No database selected on the MySQL connection".to_string(),
            ));
        };

        let sql = r#"
            SELECT CAST(table_name AS CHAR)
            FROM information_schema.tables
            WHERE table_schema = ? AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let table_names = sqlx::query_scalar::<_, String>(sql)
            .bind(schema)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(Error::snapshot)?;

        let mut tables = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            let mut table = Table::new(&table_name);

            let sql = r#"
                SELECT
                    CAST(column_name AS CHAR) AS column_name,
                    CAST(column_type AS CHAR) AS column_type,
                    CAST(is_nullable AS CHAR) AS is_nullable,
                    CAST(column_default AS CHAR) AS column_default,
                    CAST(extra AS CHAR) AS extra
                FROM information_schema.columns
                WHERE table_schema = ? AND table_name = ?
                ORDER BY ordinal_position
            "#;

            let column_rows = sqlx::query_as::<_, MySqlColumnRow>(sql)
                .bind(schema)
                .bind(&table_name)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            for row in column_rows {
                let auto_increment = row
                    .extra
                    .as_deref()
                    .map_or(false, |extra| extra.contains("auto_increment"));

                table.add_column(Column {
                    name: row.column_name,
                    data_type: row.column_type,
                    nullable: row.is_nullable == "YES",
                    default: row.column_default,
                    auto_increment,
                    comment: None,
                });
            }

            let sql = r#"
                SELECT
                    CAST(index_name AS CHAR) AS constraint_name,
                    CAST(column_name AS CHAR) AS column_name
                FROM information_schema.statistics
                WHERE table_schema = ? AND table_name = ? AND index_name = 'PRIMARY'
                ORDER BY seq_in_index
            "#;

            let pk_rows = sqlx::query_as::<_, PrimaryKeyRow>(sql)
                .bind(schema)
                .bind(&table_name)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            table.primary_key = primary_key_from_rows(pk_rows);

            let sql = r#"
                SELECT
                    CAST(index_name AS CHAR) AS index_name,
                    CAST(column_name AS CHAR) AS column_name,
                    CAST(non_unique AS SIGNED) AS non_unique
                FROM information_schema.statistics
                WHERE table_schema = ? AND table_name = ? AND index_name <> 'PRIMARY'
                ORDER BY index_name, seq_in_index
            "#;

            let index_rows = sqlx::query_as::<_, MySqlIndexRow>(sql)
                .bind(schema)
                .bind(&table_name)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            table.indexes = indexes_from_rows(
                index_rows
                    .into_iter()
                    .map(|row| IndexRow {
                        index_name: row.index_name,
                        column_name: row.column_name,
                        is_unique: row.non_unique == 0,
                    })
                    .collect(),
            );

            let sql = r#"
                SELECT
                    CAST(kcu.constraint_name AS CHAR) AS constraint_name,
                    CAST(kcu.column_name AS CHAR) AS column_name,
                    CAST(kcu.referenced_table_name AS CHAR) AS ref_table,
                    CAST(kcu.referenced_column_name AS CHAR) AS ref_column,
                    CAST(rc.delete_rule AS CHAR) AS delete_rule,
                    CAST(rc.update_rule AS CHAR) AS update_rule
                FROM information_schema.key_column_usage kcu
                JOIN information_schema.referential_constraints rc
                    ON rc.constraint_schema = kcu.constraint_schema
                    AND rc.constraint_name = kcu.constraint_name
                WHERE kcu.table_schema = ? AND kcu.table_name = ?
                ORDER BY kcu.constraint_name, kcu.ordinal_position
            "#;

            let fk_rows = sqlx::query_as::<_, ForeignKeyRow>(sql)
                .bind(schema)
                .bind(&table_name)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            table.foreign_keys = foreign_keys_from_rows(fk_rows);

            tables.push(table);
        }

        Ok(tables)
    }
}

/// SQLite schema analyzer
struct SqliteAnalyzer<'a> {
    conn: &'a mut SqliteConnection,
}

fn quote_sqlite(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

impl<'a> SqliteAnalyzer<'a> {
    /// Primary key columns of `table` in key order
    async fn primary_key_columns(&mut self, schema: &str, table: &str) -> Result<Vec<String>> {
        let pragma = format!("PRAGMA {}.table_info({})", schema, quote_sqlite(table));
        let rows = sqlx::query(&pragma)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(Error::snapshot)?;

        let mut columns: Vec<(i64, String)> = Vec::new();
        for row in rows {
            let pk: i64 = row.try_get("pk").map_err(Error::snapshot)?;
            if pk > 0 {
                columns.push((pk, row.try_get("name").map_err(Error::snapshot)?));
            }
        }
        columns.sort_by_key(|(position, _)| *position);

        Ok(columns.into_iter().map(|(_, name)| name).collect())
    }
}

#[async_trait]
impl<'a> Analyzer for SqliteAnalyzer<'a> {
    async fn current_schema(&mut self) -> Result<Option<String>> {
        Ok(Some("main".to_string()))
    }

    async fn analyze_tables(&mut self, schema_name: Option<&str>) -> Result<Vec<Table>> {
        let schema = quote_sqlite(schema_name.unwrap_or("main"));

        let sql = format!(
            "SELECT name FROM {}.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            schema
        );
        let table_names = sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(Error::snapshot)?;

        let mut tables = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            let mut table = Table::new(&table_name);
            let quoted_table = quote_sqlite(&table_name);

            let pragma = format!("PRAGMA {}.table_info({})", schema, quoted_table);
            let column_rows = sqlx::query(&pragma)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            let mut pk_columns: Vec<(i64, String)> = Vec::new();
            for row in column_rows {
                let name: String = row.try_get("name").map_err(Error::snapshot)?;
                let data_type: String = row.try_get("type").map_err(Error::snapshot)?;
                let notnull: i64 = row.try_get("notnull").map_err(Error::snapshot)?;
                let default: Option<String> = row.try_get("dflt_value").map_err(Error::snapshot)?;
                let pk: i64 = row.try_get("pk").map_err(Error::snapshot)?;

                if pk > 0 {
                    pk_columns.push((pk, name.clone()));
                }

                table.add_column(Column {
                    name,
                    data_type,
                    // Primary key columns reject NULL even without an explicit NOT NULL
                    nullable: notnull == 0 && pk == 0,
                    default,
                    auto_increment: false,
                    comment: None,
                });
            }

            if !pk_columns.is_empty() {
                pk_columns.sort_by_key(|(position, _)| *position);
                table.set_primary_key(PrimaryKey {
                    name: None,
                    columns: pk_columns.into_iter().map(|(_, name)| name).collect(),
                });
            }

            let pragma = format!("PRAGMA {}.index_list({})", schema, quoted_table);
            let index_list = sqlx::query(&pragma)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            for row in index_list {
                let origin: String = row.try_get("origin").map_err(Error::snapshot)?;
                if origin == "pk" {
                    continue;
                }

                let index_name: String = row.try_get("name").map_err(Error::snapshot)?;
                let unique: i64 = row.try_get("unique").map_err(Error::snapshot)?;

                let pragma = format!("PRAGMA {}.index_info({})", schema, quote_sqlite(&index_name));
                let mut index_columns: Vec<(i64, String)> = Vec::new();
                for column_row in sqlx::query(&pragma)
                    .fetch_all(&mut *self.conn)
                    .await
                    .map_err(Error::snapshot)?
                {
                    let seqno: i64 = column_row.try_get("seqno").map_err(Error::snapshot)?;
                    let name: Option<String> = column_row.try_get("name").map_err(Error::snapshot)?;
                    // Expression indexes have no column name
                    if let Some(name) = name {
                        index_columns.push((seqno, name));
                    }
                }
                index_columns.sort_by_key(|(seqno, _)| *seqno);

                table.add_index(Index {
                    name: index_name,
                    columns: index_columns.into_iter().map(|(_, name)| name).collect(),
                    is_unique: unique != 0,
                });
            }

            let pragma = format!("PRAGMA {}.foreign_key_list({})", schema, quoted_table);
            let fk_list = sqlx::query(&pragma)
                .fetch_all(&mut *self.conn)
                .await
                .map_err(Error::snapshot)?;

            let mut fk_rows = Vec::with_capacity(fk_list.len());
            for row in fk_list {
                let id: i64 = row.try_get("id").map_err(Error::snapshot)?;
                let seq: i64 = row.try_get("seq").map_err(Error::snapshot)?;
                let ref_table: String = row.try_get("table").map_err(Error::snapshot)?;
                let to: Option<String> = row.try_get("to").map_err(Error::snapshot)?;

                // `REFERENCES parent` without a column list targets the parent's primary key
                let ref_column = match to {
                    Some(to) => to,
                    None => self
                        .primary_key_columns(&schema, &ref_table)
                        .await?
                        .into_iter()
                        .nth(usize::try_from(seq).unwrap_or_default())
                        .unwrap_or_default(),
                };

                fk_rows.push(ForeignKeyRow {
                    constraint_name: format!("fk_{}_{}", table_name, id),
                    column_name: row.try_get("from").map_err(Error::snapshot)?,
                    ref_table,
                    ref_column,
                    delete_rule: row.try_get("on_delete").map_err(Error::snapshot)?,
                    update_rule: row.try_get("on_update").map_err(Error::snapshot)?,
                });
            }

            // foreign_key_list lists constraints in reverse id order
            fk_rows.sort_by(|a, b| a.constraint_name.cmp(&b.constraint_name));
            table.foreign_keys = foreign_keys_from_rows(fk_rows);

            tables.push(table);
        }

        Ok(tables)
    }
}
