//! Database connection handling
//!
//! A [`DataSource`] is a pool that hands out scoped [`Connection`]s. A
//! [`Database`] wraps a borrowed connection together with the schema it
//! should be inspected under.

use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::{
    mysql::MySqlPoolOptions, postgres::PgPoolOptions, sqlite::SqlitePoolOptions, MySql, Pool,
    Postgres, Sqlite,
};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Pooled connection source for the supported databases
#[derive(Debug, Clone)]
pub enum DataSource {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
    Sqlite(Pool<Sqlite>),
}

impl DataSource {
    /// Create a new data source from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool_size = config.pool_size.unwrap_or(10);
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(30));

        match config.driver.as_str() {
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await
                    .map_err(Error::connection)?;

                Ok(DataSource::Postgres(pool))
            }
            "mysql" => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await
                    .map_err(Error::connection)?;

                Ok(DataSource::MySql(pool))
            }
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await
                    .map_err(Error::connection)?;

                Ok(DataSource::Sqlite(pool))
            }
            _ => Err(Error::ConfigError(format!(
                "Unsupported database driver: {}",
                config.driver
            ))),
        }
    }

    /// Check a connection out of the pool
    ///
    /// The connection returns to the pool when dropped, whichever way the
    /// caller exits.
    pub async fn acquire(&self) -> Result<Connection> {
        let connection = match self {
            DataSource::Postgres(pool) => Connection::Postgres(pool.acquire().await.map_err(Error::connection)?),
            DataSource::MySql(pool) => Connection::MySql(pool.acquire().await.map_err(Error::connection)?),
            DataSource::Sqlite(pool) => Connection::Sqlite(pool.acquire().await.map_err(Error::connection)?),
        };

        tracing::trace!(driver = self.driver(), "Acquired connection");
        Ok(connection)
    }

    /// Driver name as used in configuration
    pub fn driver(&self) -> &'static str {
        match self {
            DataSource::Postgres(_) => "postgres",
            DataSource::MySql(_) => "mysql",
            DataSource::Sqlite(_) => "sqlite",
        }
    }
}

/// A single live connection checked out of a [`DataSource`]
pub enum Connection {
    Postgres(PoolConnection<Postgres>),
    MySql(PoolConnection<MySql>),
    Sqlite(PoolConnection<Sqlite>),
}

impl Connection {
    /// Driver name as used in configuration
    pub fn driver(&self) -> &'static str {
        match self {
            Connection::Postgres(_) => "postgres",
            Connection::MySql(_) => "mysql",
            Connection::Sqlite(_) => "sqlite",
        }
    }
}

impl From<PoolConnection<Postgres>> for Connection {
    fn from(connection: PoolConnection<Postgres>) -> Self {
        Connection::Postgres(connection)
    }
}

impl From<PoolConnection<MySql>> for Connection {
    fn from(connection: PoolConnection<MySql>) -> Self {
        Connection::MySql(connection)
    }
}

impl From<PoolConnection<Sqlite>> for Connection {
    fn from(connection: PoolConnection<Sqlite>) -> Self {
        Connection::Sqlite(connection)
    }
}

/// Database handle over a borrowed connection
pub struct Database<'c> {
    pub(crate) connection: &'c mut Connection,
    default_schema: Option<String>,
}

impl<'c> Database<'c> {
    pub fn new(connection: &'c mut Connection) -> Self {
        Self {
            connection,
            default_schema: None,
        }
    }

    /// Inspect `schema` instead of the connection's current schema
    pub fn set_default_schema_name(&mut self, schema: &str) {
        self.default_schema = Some(schema.to_string());
    }

    pub fn default_schema_name(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    pub fn driver(&self) -> &'static str {
        self.connection.driver()
    }
}
