//! Domain Layer
//!
//! Value objects and the ports the collection engine depends on.
//!
//! # Usage
//!
//! ```ignore
//! use autoincrement_watch::domain::ports::{DatabaseClient, MetricSink};
//!
//! // Use traits for dependency injection
//! async fn report<D, S>(db: &D, sink: &S) -> Result<()>
//! where
//!     D: DatabaseClient,
//!     S: MetricSink,
//! {
//!     let tables = db.list_tables().await?;
//!     // ...
//! }
//! ```

pub mod ports;

pub use ports::{
    ColumnDescription, DatabaseClient, FetchOutcome, KeyRole, MetricFetcher, MetricSample,
    MetricSink, MetricUnit, RawColumn, TableSchema,
};
