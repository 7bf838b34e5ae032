//! autoincrement-watch - MySQL Auto-Increment Collector
//!
//! Periodically finds the highest value assigned by any auto-increment
//! column in a MySQL database and reports it to a monitoring sink, so that
//! counters approaching their type's limit can be alerted on.
//!
//! # Architecture
//!
//! Collection fans out at two levels and never lets one failure hide the
//! others:
//!
//! ```text
//! Orchestrator ──▶ Fetcher tasks (parallel) ──▶ Sink
//!                      │
//!                      └──▶ Aggregator ──▶ Table tasks (parallel)
//!                                            Inspector + Probe
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Infrastructure adapters implementing domain ports
//! - [`collector`] - Inspector, probe, aggregator, registry and orchestrator
//! - [`config`] - Database connection parameters
//! - [`domain`] - Value objects and ports
//! - [`error`] - Error types

pub mod adapters;
pub mod collector;
pub mod config;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use collector::{
    AutoIncrementAggregator, AutoIncrementFetcher, CollectionOrchestrator, CycleReport,
    EmptyColumnPolicy, FetcherRegistry,
};
pub use config::DatabaseConfig;
pub use domain::{DatabaseClient, FetchOutcome, MetricFetcher, MetricSample, MetricSink};
pub use error::{Error, ErrorKind, FailureSet, Result};
