//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! This module defines the core abstractions (ports) that the collection
//! engine depends on. Infrastructure adapters implement these traits to
//! provide concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  DatabaseClient │ MetricSink │ MetricFetcher        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  MySqlClient │ PushgatewaySink │ LoggingSink        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{FailureSet, Result};

// =============================================================================
// Value Objects
// =============================================================================

/// Index role of a column, as reported in the `Key` field of `DESCRIBE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyRole {
    None,
    Primary,
    Unique,
    Index,
}

impl KeyRole {
    /// Parse the database's key marker (`""`, `PRI`, `UNI`, `MUL`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "" => Some(KeyRole::None),
            "PRI" => Some(KeyRole::Primary),
            "UNI" => Some(KeyRole::Unique),
            "MUL" => Some(KeyRole::Index),
            _ => None,
        }
    }
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyRole::None => write!(f, "none"),
            KeyRole::Primary => write!(f, "primary"),
            KeyRole::Unique => write!(f, "unique"),
            KeyRole::Index => write!(f, "index"),
        }
    }
}

/// One column row exactly as the database describes it, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawColumn {
    pub field: String,
    pub column_type: String,
    pub null: String,
    pub key: String,
    pub default: Option<String>,
    pub extra: String,
}

/// Validated description of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescription {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub key_role: KeyRole,
    pub default_value: Option<String>,
    /// Free-form attributes such as `auto_increment` or `on update CURRENT_TIMESTAMP`
    pub extra: String,
}

impl ColumnDescription {
    /// Whether the database assigns this column's value on insert.
    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_ascii_lowercase().contains("auto_increment")
    }
}

/// Ordered columns of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDescription>,
}

impl TableSchema {
    /// Columns whose values are assigned by auto-increment, in declaration order.
    pub fn auto_increment_columns(&self) -> impl Iterator<Item = &ColumnDescription> {
        self.columns.iter().filter(|c| c.is_auto_increment())
    }
}

/// Unit of measure attached to a published sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetricUnit {
    Count,
    None,
}

impl std::fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricUnit::Count => write!(f, "Count"),
            MetricUnit::None => write!(f, "None"),
        }
    }
}

/// A single metric observation produced by a fetcher for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub namespace: String,
    pub metric_name: String,
    pub value: f64,
    pub unit: MetricUnit,
    pub dimensions: BTreeMap<String, String>,
    pub collected_at: DateTime<Utc>,
}

impl MetricSample {
    /// Create a `Count` sample with no dimensions.
    pub fn new(namespace: impl Into<String>, metric_name: impl Into<String>, value: f64) -> Self {
        Self {
            namespace: namespace.into(),
            metric_name: metric_name.into(),
            value,
            unit: MetricUnit::Count,
            dimensions: BTreeMap::new(),
            collected_at: Utc::now(),
        }
    }

    pub fn with_unit(mut self, unit: MetricUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(name.into(), value.into());
        self
    }
}

// =============================================================================
// Database Port
// =============================================================================

/// Port for the read-only database operations the collector needs.
///
/// Implementations are shared by every concurrent table worker, so each
/// method must be safe to call concurrently on one instance. Adapters backed
/// by a single connection must serialize internally or hold a pool and
/// acquire a connection per call.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// List the base tables of the configured database.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Describe a table's columns in declaration order.
    async fn describe_table(&self, table: &str) -> Result<Vec<RawColumn>>;

    /// Textual `MAX(column)` of a table; `None` when the column holds no values.
    async fn max_column_value(&self, table: &str, column: &str) -> Result<Option<String>>;

    /// Check that the database is reachable.
    async fn ping(&self) -> Result<()>;
}

// =============================================================================
// Metric Sink Port
// =============================================================================

/// Port for the external monitoring sink.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Publish one sample. The sink receives the sample unchanged.
    async fn publish(&self, sample: &MetricSample) -> Result<()>;
}

// =============================================================================
// Metric Fetcher Port
// =============================================================================

/// A fetched sample plus the sub-source failures it was computed around.
///
/// A partial outcome is still published; its failures are reported
/// against the fetcher alongside it.
#[derive(Debug)]
pub struct FetchOutcome {
    pub sample: MetricSample,
    pub partial_failures: Option<FailureSet>,
}

impl FetchOutcome {
    pub fn complete(sample: MetricSample) -> Self {
        Self {
            sample,
            partial_failures: None,
        }
    }

    pub fn partial(sample: MetricSample, failures: FailureSet) -> Self {
        Self {
            sample,
            partial_failures: failures.into_option(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.partial_failures.is_none()
    }
}

impl From<MetricSample> for FetchOutcome {
    fn from(sample: MetricSample) -> Self {
        Self::complete(sample)
    }
}

/// A pluggable producer of one sample per collection cycle.
#[async_trait]
pub trait MetricFetcher: Send + Sync {
    /// Stable identity used to attribute failures.
    fn name(&self) -> &str;

    /// Produce this cycle's sample, possibly computed from a subset of its
    /// sources, or the failure that prevented any sample at all.
    async fn fetch(&self) -> Result<FetchOutcome>;
}

// =============================================================================
// Tests
// =============================================================================
