//! Metric Fetchers
//!
//! The built-in auto-increment fetcher and the immutable registry the
//! orchestrator runs every cycle.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::aggregator::AutoIncrementAggregator;
use crate::domain::ports::{FetchOutcome, MetricFetcher, MetricSample, MetricUnit};
use crate::error::{Error, Result};

// =============================================================================
// Auto-Increment Fetcher
// =============================================================================

/// Naming of the auto-increment sample
#[derive(Debug, Clone)]
pub struct AutoIncrementMetricConfig {
    pub namespace: String,
    pub metric_name: String,
    pub dimension_name: String,
    /// Usually the database name
    pub dimension_value: String,
}

impl AutoIncrementMetricConfig {
    pub fn for_database(database: impl Into<String>) -> Self {
        Self {
            namespace: "MySql/AutoIncrement".to_string(),
            metric_name: "AutoIncrement".to_string(),
            dimension_name: "DBName".to_string(),
            dimension_value: database.into(),
        }
    }
}

/// Reports the highest auto-increment value across all tables.
#[derive(Debug, Clone)]
pub struct AutoIncrementFetcher {
    aggregator: AutoIncrementAggregator,
    metric: AutoIncrementMetricConfig,
}

impl AutoIncrementFetcher {
    pub const NAME: &'static str = "auto_increment";

    pub fn new(aggregator: AutoIncrementAggregator, metric: AutoIncrementMetricConfig) -> Self {
        Self { aggregator, metric }
    }
}

#[async_trait]
impl MetricFetcher for AutoIncrementFetcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<FetchOutcome> {
        let outcome = self.aggregator.collect().await?;

        let failures = match outcome.error {
            Some(failures) if outcome.tables.is_empty() => {
                // No table answered, so there is no maximum to report.
                return Err(Error::Aggregate(failures));
            }
            Some(failures) => {
                warn!(
                    best_known_max = outcome.max,
                    scanned_tables = outcome.tables.len(),
                    failed_tables = failures.len(),
                    "Auto-increment aggregation incomplete, publishing best-known maximum"
                );
                Some(failures)
            }
            None => {
                info!(
                    max_auto_increment = outcome.max,
                    tables = outcome.tables.len(),
                    "Auto-increment aggregation complete"
                );
                None
            }
        };

        let sample = MetricSample::new(
            self.metric.namespace.clone(),
            self.metric.metric_name.clone(),
            outcome.max as f64,
        )
        .with_unit(MetricUnit::Count)
        .with_dimension(
            self.metric.dimension_name.clone(),
            self.metric.dimension_value.clone(),
        );

        Ok(match failures {
            Some(failures) => FetchOutcome::partial(sample, failures),
            None => FetchOutcome::complete(sample),
        })
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Ordered, immutable set of fetchers built once at startup.
#[derive(Clone, Default)]
pub struct FetcherRegistry {
    fetchers: Arc<Vec<Arc<dyn MetricFetcher>>>,
}

impl FetcherRegistry {
    pub fn builder() -> FetcherRegistryBuilder {
        FetcherRegistryBuilder::default()
    }

    /// Fetchers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn MetricFetcher>> {
        self.fetchers.iter()
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fetchers.iter().map(|f| f.name()).collect()
    }
}

impl std::fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherRegistry")
            .field("fetchers", &self.names())
            .finish()
    }
}

/// Builder for [`FetcherRegistry`].
#[derive(Default)]
pub struct FetcherRegistryBuilder {
    fetchers: Vec<Arc<dyn MetricFetcher>>,
}

impl FetcherRegistryBuilder {
    pub fn register<F: MetricFetcher + 'static>(self, fetcher: F) -> Self {
        self.register_shared(Arc::new(fetcher))
    }

    pub fn register_shared(mut self, fetcher: Arc<dyn MetricFetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    /// Freeze the registry. Fetcher names must be unique since failures are
    /// attributed by name.
    pub fn build(self) -> Result<FetcherRegistry> {
        let mut seen = HashSet::new();
        for fetcher in &self.fetchers {
            if !seen.insert(fetcher.name().to_string()) {
                return Err(Error::Config(format!(
                    "fetcher {} registered more than once",
                    fetcher.name()
                )));
            }
        }

        Ok(FetcherRegistry {
            fetchers: Arc::new(self.fetchers),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryDatabase, InMemoryTable};
    use crate::collector::aggregator::AggregatorConfig;
    use crate::error::ErrorKind;
    use assert_matches::assert_matches;

    fn fetcher(db: InMemoryDatabase) -> AutoIncrementFetcher {
        let aggregator = AutoIncrementAggregator::new(Arc::new(db), AggregatorConfig::default());
        AutoIncrementFetcher::new(aggregator, AutoIncrementMetricConfig::for_database("shop"))
    }

    #[tokio::test]
    async fn test_fetch_builds_sample() {
        let db = InMemoryDatabase::new()
            .with_table(InMemoryTable::new("orders").auto_increment("id", Some(42)))
            .with_table(InMemoryTable::new("users").column("email", "varchar(255)"));

        let outcome = fetcher(db).fetch().await.unwrap();
        assert!(outcome.is_complete());

        let sample = outcome.sample;
        assert_eq!(sample.namespace, "MySql/AutoIncrement");
        assert_eq!(sample.metric_name, "AutoIncrement");
        assert_eq!(sample.value, 42.0);
        assert_eq!(sample.unit, MetricUnit::Count);
        assert_eq!(sample.dimensions.get("DBName").map(String::as_str), Some("shop"));
    }

    #[tokio::test]
    async fn test_partial_aggregation_keeps_best_known_max() {
        let db = InMemoryDatabase::new()
            .with_table(InMemoryTable::new("orders").fail_describe("timeout"))
            .with_table(InMemoryTable::new("users").auto_increment("id", Some(7)));

        let outcome = fetcher(db).fetch().await.unwrap();

        assert_eq!(outcome.sample.value, 7.0);
        let failures = outcome.partial_failures.expect("orders failure must be carried");
        assert_eq!(failures.sources(), vec!["orders"]);
        assert_eq!(failures.get("orders").unwrap().error.kind(), ErrorKind::Query);
    }

    #[tokio::test]
    async fn test_fresh_empty_table_does_not_hide_other_maxima() {
        let db = InMemoryDatabase::new()
            .with_table(InMemoryTable::new("fresh").auto_increment("id", None))
            .with_table(InMemoryTable::new("orders").auto_increment("id", Some(2_000_000_000)));

        let outcome = fetcher(db).fetch().await.unwrap();

        assert_eq!(outcome.sample.value, 2_000_000_000.0);
        let failures = outcome.partial_failures.unwrap();
        assert_eq!(failures.get("fresh").unwrap().error.kind(), ErrorKind::Parse);
    }

    #[tokio::test]
    async fn test_fetch_fails_when_every_table_fails() {
        let db = InMemoryDatabase::new()
            .with_table(InMemoryTable::new("orders").fail_describe("timeout"))
            .with_table(InMemoryTable::new("users").auto_increment("id", Some(7)).fail_max("gone"));

        let err = fetcher(db).fetch().await.unwrap_err();
        assert_matches!(&err, Error::Aggregate(set) if set.sources() == vec!["orders", "users"]);
        assert!(err.contains_kind(ErrorKind::Query));
    }

    #[tokio::test]
    async fn test_no_tables_is_a_complete_zero() {
        let outcome = fetcher(InMemoryDatabase::new()).fetch().await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.sample.value, 0.0);
    }

    #[test]
    fn test_registry_preserves_order() {
        let registry = FetcherRegistry::builder()
            .register(fetcher(InMemoryDatabase::new()))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["auto_increment"]);
    }

    #[test]
    fn test_registry_rejects_duplicate_names() {
        let err = FetcherRegistry::builder()
            .register(fetcher(InMemoryDatabase::new()))
            .register(fetcher(InMemoryDatabase::new()))
            .build()
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_empty_registry() {
        let registry = FetcherRegistry::builder().build().unwrap();
        assert!(registry.is_empty());
    }
}
