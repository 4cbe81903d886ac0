//! Shared helpers for integration tests

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use schema_drift::config::DatabaseConfig;
use schema_drift::schema::{Column, PrimaryKey, SchemaSnapshot, Table};
use schema_drift::DataSource;
use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Log output collected by [`capture_logs`]
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        let buffer = self.0.lock().expect("log buffer poisoned");
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn has_level(&self, level: &str) -> bool {
        self.contents().lines().any(|line| line.trim_start().starts_with(level))
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route events on the current thread into a buffer until the guard drops
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(Level::TRACE)
        .with_ansi(false)
        .without_time()
        .finish();

    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

pub fn table_a() -> Table {
    Table::new("a")
        .with_column(Column::new("id", "BIGINT"))
        .with_column(Column::new("name", "VARCHAR(255)").nullable(true))
        .with_primary_key(PrimaryKey::new(&["id"]))
}

pub fn table_b() -> Table {
    Table::new("b")
        .with_column(Column::new("id", "BIGINT"))
        .with_primary_key(PrimaryKey::new(&["id"]))
}

/// `{A(id, name), B(id)}`
pub fn reference_snapshot() -> SchemaSnapshot {
    SchemaSnapshot::new(None).with_table(table_a()).with_table(table_b())
}

/// `{A(id, name)}`
pub fn actual_snapshot() -> SchemaSnapshot {
    SchemaSnapshot::new(None).with_table(table_a())
}

/// A single-connection in-memory SQLite data source
pub async fn sqlite_data_source(statements: &[&str]) -> DataSource {
    let config = DatabaseConfig {
        driver: "sqlite".to_string(),
        url: "sqlite::memory:".to_string(),
        pool_size: Some(1),
        timeout_seconds: Some(5),
        schema: None,
    };

    let data_source = DataSource::connect(&config).await.expect("sqlite pool");
    let DataSource::Sqlite(pool) = &data_source else {
        unreachable!("sqlite driver yields a sqlite pool");
    };
    for statement in statements {
        sqlx::query(statement).execute(pool).await.expect("setup statement");
    }

    data_source
}
