//! In-Memory Database Adapter
//!
//! Implements the `DatabaseClient` port over a fixed set of tables held in
//! memory. Failures and latency can be injected per table, which makes it the
//! backing store for collector tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::ports::{DatabaseClient, RawColumn};
use crate::error::{Error, Result};

/// One table of an [`InMemoryDatabase`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryTable {
    name: String,
    columns: Vec<RawColumn>,
    max_values: HashMap<String, Option<String>>,
    describe_failure: Option<String>,
    max_failure: Option<String>,
    delay: Option<Duration>,
}

impl InMemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an ordinary column.
    pub fn column(mut self, name: &str, column_type: &str) -> Self {
        self.columns.push(RawColumn {
            field: name.to_string(),
            column_type: column_type.to_string(),
            null: "YES".to_string(),
            ..Default::default()
        });
        self
    }

    /// Add an auto-increment primary key whose current maximum is `max`
    /// (`None` for an empty table).
    pub fn auto_increment(mut self, name: &str, max: Option<i64>) -> Self {
        self.columns.push(RawColumn {
            field: name.to_string(),
            column_type: "bigint unsigned".to_string(),
            null: "NO".to_string(),
            key: "PRI".to_string(),
            default: None,
            extra: "auto_increment".to_string(),
        });
        self.max_values
            .insert(name.to_string(), max.map(|v| v.to_string()));
        self
    }

    /// Add a column described exactly as given.
    pub fn raw_column(mut self, column: RawColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Override the textual maximum returned for `column`.
    pub fn raw_max(mut self, column: &str, value: Option<&str>) -> Self {
        self.max_values
            .insert(column.to_string(), value.map(str::to_string));
        self
    }

    /// Make `describe_table` fail for this table.
    pub fn fail_describe(mut self, message: &str) -> Self {
        self.describe_failure = Some(message.to_string());
        self
    }

    /// Make `max_column_value` fail for this table.
    pub fn fail_max(mut self, message: &str) -> Self {
        self.max_failure = Some(message.to_string());
        self
    }

    /// Delay every query against this table.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// In-memory database for testing.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    tables: RwLock<Vec<InMemoryTable>>,
    list_failure: RwLock<Option<String>>,
    queries: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Tracks one query while it is in flight.
struct QueryGuard<'a> {
    db: &'a InMemoryDatabase,
}

impl QueryGuard<'_> {
    /// The query got past its latency and returned.
    fn complete(self) {
        self.db.completed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        self.db.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: InMemoryTable) -> Self {
        self.tables.write().push(table);
        self
    }

    /// Make `list_tables` fail.
    pub fn fail_list_tables(self, message: &str) -> Self {
        *self.list_failure.write() = Some(message.to_string());
        self
    }

    /// Number of queries started so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of queries that ran to completion rather than being cancelled.
    pub fn completed_queries(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Queries currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of queries ever in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn begin(&self) -> QueryGuard<'_> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        QueryGuard { db: self }
    }

    fn table(&self, name: &str) -> Option<InMemoryTable> {
        self.tables.read().iter().find(|t| t.name == name).cloned()
    }

    /// Look up a table and sleep for its injected latency.
    async fn latency(&self, name: &str) -> Option<InMemoryTable> {
        let entry = self.table(name)?;
        if let Some(delay) = entry.delay {
            tokio::time::sleep(delay).await;
        }
        Some(entry)
    }

    fn rejected(context: String, message: &str) -> Error {
        Error::query(context, sqlx::Error::Protocol(message.to_string()))
    }
}

#[async_trait]
impl DatabaseClient for InMemoryDatabase {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let query = self.begin();
        let outcome = match self.list_failure.read().clone() {
            Some(message) => Err(Self::rejected("list tables".to_string(), &message)),
            None => Ok(self.tables.read().iter().map(|t| t.name.clone()).collect()),
        };
        query.complete();
        outcome
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>> {
        let query = self.begin();
        let entry = self.latency(table).await;
        query.complete();

        let entry =
            entry.ok_or_else(|| Self::rejected(format!("describe {}", table), "table doesn't exist"))?;

        if let Some(message) = &entry.describe_failure {
            return Err(Self::rejected(format!("describe {}", table), message));
        }
        Ok(entry.columns)
    }

    async fn max_column_value(&self, table: &str, column: &str) -> Result<Option<String>> {
        let query = self.begin();
        let entry = self.latency(table).await;
        query.complete();

        let context = format!("max of {}.{}", table, column);
        let entry = entry.ok_or_else(|| Self::rejected(context.clone(), "table doesn't exist"))?;

        if let Some(message) = &entry.max_failure {
            return Err(Self::rejected(context, message));
        }
        entry
            .max_values
            .get(column)
            .cloned()
            .ok_or_else(|| Self::rejected(context, "unknown column"))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
