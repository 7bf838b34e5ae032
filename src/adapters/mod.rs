//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │          DatabaseClient │ MetricSink │ MetricFetcher        │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ MySqlClient │ InMemoryDatabase                             │ │
//! │  │ PushgatewaySink │ LoggingSink │ InMemorySink               │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use autoincrement_watch::adapters::{MySqlClient, PushgatewaySink, PushgatewayConfig};
//! use autoincrement_watch::domain::ports::DatabaseClient;
//!
//! let db = MySqlClient::connect_lazy(&config);
//! let tables = db.list_tables().await?;
//! ```

mod in_memory;
mod mysql;
mod pushgateway;
mod sink;

pub use in_memory::{InMemoryDatabase, InMemoryTable};
pub use mysql::{quote_identifier, MySqlClient};
pub use pushgateway::{encode_sample, sanitize_name, PushgatewayConfig, PushgatewaySink};
pub use sink::{InMemorySink, LoggingSink};
