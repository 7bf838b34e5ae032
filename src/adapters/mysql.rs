//! MySQL Database Adapter
//!
//! Implements the `DatabaseClient` port on an `sqlx` MySQL connection pool.
//! Every call acquires its own pooled connection, which is returned to the
//! pool when the call finishes, successful or not.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool, Row};
use tracing::{debug, info_span, instrument, Instrument};

use crate::config::DatabaseConfig;
use crate::domain::ports::{DatabaseClient, RawColumn};
use crate::error::{Error, Result};

const LIST_TABLES_SQL: &str = "SELECT TABLE_NAME FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
     ORDER BY TABLE_NAME";

/// MySQL-backed database client.
#[derive(Clone)]
pub struct MySqlClient {
    pool: MySqlPool,
    database: String,
}

impl MySqlClient {
    /// Build a pool that connects on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy_with(options);

        Self {
            pool,
            database: config.database.clone(),
        }
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: MySqlPool, database: impl Into<String>) -> Self {
        Self {
            pool,
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn acquire(&self) -> Result<PoolConnection<MySql>> {
        self.pool.acquire().await.map_err(Error::Connection)
    }
}

impl std::fmt::Debug for MySqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlClient")
            .field("database", &self.database)
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    #[instrument(skip(self), fields(db = %self.database))]
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut conn = self.acquire().await?;
        let span = info_span!("db.query", db.system = "mysql", db.operation = "SELECT");

        let rows = sqlx::query(LIST_TABLES_SQL)
            .fetch_all(&mut *conn)
            .instrument(span)
            .await
            .map_err(|e| classify("list tables", e))?;

        let tables = rows
            .iter()
            .map(|row| text(row, 0))
            .collect::<Result<Vec<_>>>()?;

        debug!("Found {} tables", tables.len());
        Ok(tables)
    }

    #[instrument(skip(self))]
    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>> {
        let mut conn = self.acquire().await?;
        let sql = format!("SHOW COLUMNS FROM {}", quote_identifier(table));
        let span = info_span!("db.query", db.system = "mysql", db.operation = "SHOW");

        let rows = sqlx::query(&sql)
            .persistent(false)
            .fetch_all(&mut *conn)
            .instrument(span)
            .await
            .map_err(|e| classify(&format!("describe {}", table), e))?;

        rows.iter()
            .map(|row| -> Result<RawColumn> {
                Ok(RawColumn {
                    field: text(row, 0)?,
                    column_type: text(row, 1)?,
                    null: text(row, 2)?,
                    key: text(row, 3)?,
                    default: optional_text(row, 4)?,
                    extra: text(row, 5)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn max_column_value(&self, table: &str, column: &str) -> Result<Option<String>> {
        let mut conn = self.acquire().await?;
        let sql = format!(
            "SELECT CAST(MAX({}) AS CHAR) FROM {}",
            quote_identifier(column),
            quote_identifier(table)
        );
        let span = info_span!("db.query", db.system = "mysql", db.operation = "SELECT");

        let row = sqlx::query(&sql)
            .persistent(false)
            .fetch_one(&mut *conn)
            .instrument(span)
            .await
            .map_err(|e| classify(&format!("max of {}.{}", table, column), e))?;

        optional_text(&row, 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.acquire().await?;
        sqlx::query("SELECT 1")
            .execute(&mut *conn)
            .await
            .map_err(|e| classify("ping", e))?;
        Ok(())
    }
}

/// Quote a MySQL identifier with backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Split sqlx failures into connection, decode and query errors.
fn classify(context: &str, e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => Error::Connection(e),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            Error::Decode(format!("{}: {}", context, e))
        }
        other => Error::query(context, other),
    }
}

/// Read a text column. MySQL 8 reports some metadata columns as binary.
fn text(row: &MySqlRow, index: usize) -> Result<String> {
    optional_text(row, index)?
        .ok_or_else(|| Error::Decode(format!("column {} is unexpectedly NULL", index)))
}

fn optional_text(row: &MySqlRow, index: usize) -> Result<Option<String>> {
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return Ok(value);
    }

    let bytes = row
        .try_get::<Option<Vec<u8>>, _>(index)
        .map_err(|e| Error::Decode(format!("column {}: {}", index, e)))?;

    bytes
        .map(|b| {
            String::from_utf8(b).map_err(|e| Error::Decode(format!("column {} is not UTF-8: {}", index, e)))
        })
        .transpose()
}
