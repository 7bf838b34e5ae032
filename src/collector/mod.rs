//! Collector module
//!
//! The concurrent collection engine: schema inspection, column probing,
//! per-table aggregation, the fetcher registry and the cycle orchestrator.

mod aggregator;
mod fetcher;
mod inspector;
mod orchestrator;
mod probe;

pub use aggregator::{
    AggregateOutcome, AggregatorConfig, AutoIncrementAggregator, SourceProbeResult, TableMaximum,
};
pub use fetcher::{
    AutoIncrementFetcher, AutoIncrementMetricConfig, FetcherRegistry, FetcherRegistryBuilder,
};
pub use inspector::{decode_column, SchemaInspector};
pub use orchestrator::{CollectionOrchestrator, CycleReport, OrchestratorConfig};
pub use probe::{parse_max_value, ColumnValueProbe, EmptyColumnPolicy};
