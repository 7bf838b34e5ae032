//! Per-Source Aggregator
//!
//! Computes the largest auto-increment value across every table of a
//! database. One worker task is spawned per table; each produces exactly one
//! outcome, and the outcomes are reduced into a single maximum plus a typed
//! set of per-table failures. At most `max_concurrency` workers query the
//! database at once, and dropping a collection aborts its workers.
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ list_tables  │  (fatal on failure)
//!                 └──────┬───────┘
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!     [orders]       [users]       [items]     one task per table
//!     inspect+probe  inspect+probe inspect+probe
//!          └─────────────┼─────────────┘
//!                        ▼
//!            max(successes) + FailureSet
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::inspector::SchemaInspector;
use super::probe::{ColumnValueProbe, EmptyColumnPolicy};
use crate::domain::ports::DatabaseClient;
use crate::error::{Error, FailureSet, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the aggregator
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Deadline for a single table worker, counted from its admission
    pub worker_timeout: Duration,

    /// Table workers allowed to query at once; match the pool size
    pub max_concurrency: usize,

    /// How an empty auto-increment column is counted
    pub empty_column_policy: EmptyColumnPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            worker_timeout: Duration::from_secs(30),
            max_concurrency: 10,
            empty_column_policy: EmptyColumnPolicy::Fail,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// The single outcome of one table worker.
#[derive(Debug)]
pub struct SourceProbeResult {
    pub table: String,
    pub outcome: Result<i64>,
}

/// Largest auto-increment value seen in one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableMaximum {
    pub table: String,
    pub value: i64,
}

/// Reduction of every table worker's outcome.
#[derive(Debug, Default)]
pub struct AggregateOutcome {
    /// Maximum over successful workers; 0 when none succeeded
    pub max: i64,

    /// Per-table maxima of the successful workers
    pub tables: Vec<TableMaximum>,

    /// `Some` iff at least one worker failed
    pub error: Option<FailureSet>,
}

impl AggregateOutcome {
    /// Fold worker results into an outcome.
    pub fn from_results(results: impl IntoIterator<Item = SourceProbeResult>) -> Self {
        let mut max = 0;
        let mut tables = Vec::new();
        let mut failures = FailureSet::new();

        for SourceProbeResult { table, outcome } in results {
            match outcome {
                Ok(value) => {
                    max = max.max(value);
                    tables.push(TableMaximum { table, value });
                }
                Err(e) => {
                    warn!(table = %table, error = %e, "Table worker failed");
                    failures.push(table, e);
                }
            }
        }

        Self {
            max,
            tables,
            error: failures.into_option(),
        }
    }

    /// Number of worker outcomes folded in.
    pub fn outcome_count(&self) -> usize {
        self.tables.len() + self.error.as_ref().map_or(0, FailureSet::len)
    }

    /// Maximum if every worker succeeded, otherwise the combined failure.
    pub fn into_result(self) -> Result<i64> {
        match self.error {
            None => Ok(self.max),
            Some(failures) => Err(Error::Aggregate(failures)),
        }
    }
}

// =============================================================================
// Aggregator
// =============================================================================

/// Fans out over every table and keeps the highest auto-increment value.
#[derive(Clone)]
pub struct AutoIncrementAggregator {
    db: Arc<dyn DatabaseClient>,
    inspector: SchemaInspector,
    probe: ColumnValueProbe,
    config: AggregatorConfig,
}

impl AutoIncrementAggregator {
    pub fn new(db: Arc<dyn DatabaseClient>, config: AggregatorConfig) -> Self {
        Self {
            inspector: SchemaInspector::new(db.clone()),
            probe: ColumnValueProbe::new(db.clone(), config.empty_column_policy),
            db,
            config,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// List the database's tables and aggregate over all of them.
    ///
    /// Only a failure to list tables is returned as `Err`; per-table failures
    /// are carried in [`AggregateOutcome::error`].
    #[instrument(skip(self))]
    pub async fn collect(&self) -> Result<AggregateOutcome> {
        let tables = self.db.list_tables().await?;
        info!("Aggregating auto-increment maxima over {} tables", tables.len());
        Ok(self.collect_tables(tables).await)
    }

    /// Aggregate over an explicit list of tables.
    pub async fn collect_tables(&self, tables: Vec<String>) -> AggregateOutcome {
        let admission = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        // Dropping the set aborts every worker still running.
        let mut workers = JoinSet::new();
        for (index, table) in tables.iter().enumerate() {
            workers.spawn(table_worker(
                index,
                self.inspector.clone(),
                self.probe.clone(),
                table.clone(),
                admission.clone(),
                self.config.worker_timeout,
            ));
        }

        let mut outcomes: Vec<Option<Result<i64>>> =
            std::iter::repeat_with(|| None).take(tables.len()).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if let Some(slot) = outcomes.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => warn!("Table worker did not complete: {}", e),
            }
        }

        // A worker that panicked leaves its slot empty and is reported here.
        let results = tables.into_iter().zip(outcomes).map(|(table, outcome)| {
            let outcome = outcome.unwrap_or_else(|| {
                Err(Error::Internal(format!(
                    "worker for table {} did not complete",
                    table
                )))
            });
            SourceProbeResult { table, outcome }
        });

        let outcome = AggregateOutcome::from_results(results);
        debug!(
            "Aggregated {} outcomes, max {}",
            outcome.outcome_count(),
            outcome.max
        );
        outcome
    }
}

impl std::fmt::Debug for AutoIncrementAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoIncrementAggregator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn table_worker(
    index: usize,
    inspector: SchemaInspector,
    probe: ColumnValueProbe,
    table: String,
    admission: Arc<Semaphore>,
    deadline: Duration,
) -> (usize, Result<i64>) {
    let outcome = match admission.acquire().await {
        Ok(_permit) => match timeout(deadline, table_max(&inspector, &probe, &table)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout {
                worker: format!("table {}", table),
                duration: deadline,
            }),
        },
        Err(e) => Err(Error::Internal(format!(
            "admission for table {} failed: {}",
            table, e
        ))),
    };
    (index, outcome)
}

/// Largest auto-increment value in one table; 0 if it has no such column.
async fn table_max(inspector: &SchemaInspector, probe: &ColumnValueProbe, table: &str) -> Result<i64> {
    let schema = inspector.inspect(table).await?;

    // MySQL allows one auto-increment column per table; handle several anyway.
    let mut table_max = 0;
    for column in schema.auto_increment_columns() {
        let value = probe.max_value(table, &column.name).await?;
        table_max = table_max.max(value);
    }

    debug!(table = %table, max_auto_increment = table_max, "Table scanned");
    Ok(table_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryDatabase, InMemoryTable};
    use crate::error::ErrorKind;
    use proptest::prelude::*;

    fn aggregator(db: InMemoryDatabase) -> AutoIncrementAggregator {
        AutoIncrementAggregator::new(Arc::new(db), AggregatorConfig::default())
    }

    #[tokio::test]
    async fn test_table_without_auto_increment_contributes_zero() {
        let db = InMemoryDatabase::new()
            .with_table(InMemoryTable::new("settings").column("key", "varchar(64)"));

        let outcome = aggregator(db).collect().await.unwrap();
        assert_eq!(outcome.max, 0);
        assert!(outcome.error.is_none());
        assert_eq!(
            outcome.tables,
            vec![TableMaximum {
                table: "settings".into(),
                value: 0
            }]
        );
    }

    #[tokio::test]
    async fn test_multiple_auto_increment_columns_take_largest() {
        let db = InMemoryDatabase::new().with_table(
            InMemoryTable::new("odd")
                .auto_increment("id", Some(10))
                .auto_increment("seq", Some(25)),
        );

        let outcome = aggregator(db).collect().await.unwrap();
        assert_eq!(outcome.max, 25);
    }

    #[tokio::test]
    async fn test_list_tables_failure_is_fatal() {
        let db = InMemoryDatabase::new()
            .with_table(InMemoryTable::new("orders").auto_increment("id", Some(1)))
            .fail_list_tables("access denied");

        let err = aggregator(db).collect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
    }

    #[tokio::test]
    async fn test_empty_table_under_both_policies() {
        let build = || {
            InMemoryDatabase::new()
                .with_table(InMemoryTable::new("fresh").auto_increment("id", None))
                .with_table(InMemoryTable::new("users").auto_increment("id", Some(3)))
        };

        let failing = aggregator(build()).collect().await.unwrap();
        assert_eq!(failing.max, 3);
        let failures = failing.error.expect("empty table fails under Fail policy");
        assert_eq!(failures.sources(), vec!["fresh"]);
        assert_eq!(failures.get("fresh").unwrap().error.kind(), ErrorKind::Parse);

        let config = AggregatorConfig {
            empty_column_policy: EmptyColumnPolicy::Zero,
            ..Default::default()
        };
        let zeroing = AutoIncrementAggregator::new(Arc::new(build()), config)
            .collect()
            .await
            .unwrap();
        assert_eq!(zeroing.max, 3);
        assert!(zeroing.error.is_none());
    }

    #[tokio::test]
    async fn test_slow_table_times_out_without_blocking_others() {
        let db = InMemoryDatabase::new()
            .with_table(
                InMemoryTable::new("slow")
                    .auto_increment("id", Some(1000))
                    .with_delay(Duration::from_secs(5)),
            )
            .with_table(InMemoryTable::new("fast").auto_increment("id", Some(8)));
        let config = AggregatorConfig {
            worker_timeout: Duration::from_millis(50),
            ..Default::default()
        };

        let outcome = AutoIncrementAggregator::new(Arc::new(db), config)
            .collect()
            .await
            .unwrap();

        assert_eq!(outcome.max, 8);
        let failures = outcome.error.unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.get("slow").unwrap().error.kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_admission_bounds_concurrent_queries() {
        let mut db = InMemoryDatabase::new();
        for i in 0..20 {
            db = db.with_table(
                InMemoryTable::new(format!("t{:02}", i))
                    .auto_increment("id", Some(i))
                    .with_delay(Duration::from_millis(20)),
            );
        }
        let db = Arc::new(db);
        // 20 tables x 2 queries x 20ms over 2 slots takes ~400ms, well past
        // the deadline unless it only starts once a worker is admitted.
        let config = AggregatorConfig {
            worker_timeout: Duration::from_millis(250),
            max_concurrency: 2,
            ..Default::default()
        };

        let outcome = AutoIncrementAggregator::new(db.clone(), config)
            .collect()
            .await
            .unwrap();

        assert!(outcome.error.is_none(), "{:?}", outcome.error);
        assert_eq!(outcome.max, 19);
        assert_eq!(outcome.outcome_count(), 20);
        assert!(db.peak_concurrency() <= 2, "peak {}", db.peak_concurrency());
    }

    #[tokio::test]
    async fn test_dropping_collection_aborts_table_workers() {
        let db = Arc::new(
            InMemoryDatabase::new().with_table(
                InMemoryTable::new("slow")
                    .auto_increment("id", Some(1))
                    .with_delay(Duration::from_millis(300)),
            ),
        );
        let aggregator = AutoIncrementAggregator::new(db.clone(), AggregatorConfig::default());

        let cut_short = timeout(Duration::from_millis(50), aggregator.collect()).await;
        assert!(cut_short.is_err());

        tokio::time::sleep(Duration::from_millis(500)).await;
        // Only list_tables finished; the describe was aborted mid-flight.
        assert_eq!(db.completed_queries(), 1);
        assert_eq!(db.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_outcomes_keep_table_order() {
        let db = InMemoryDatabase::new()
            .with_table(
                InMemoryTable::new("late")
                    .auto_increment("id", Some(1))
                    .with_delay(Duration::from_millis(30)),
            )
            .with_table(InMemoryTable::new("early").auto_increment("id", Some(2)));

        let outcome = aggregator(db).collect().await.unwrap();
        let order: Vec<_> = outcome.tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(order, vec!["late", "early"]);
    }

    #[test]
    fn test_from_results_error_iff_failure() {
        let ok = AggregateOutcome::from_results(vec![SourceProbeResult {
            table: "a".into(),
            outcome: Ok(4),
        }]);
        assert!(ok.error.is_none());
        assert_eq!(ok.into_result().unwrap(), 4);

        let failed = AggregateOutcome::from_results(vec![
            SourceProbeResult {
                table: "a".into(),
                outcome: Ok(4),
            },
            SourceProbeResult {
                table: "b".into(),
                outcome: Err(Error::Decode("x".into())),
            },
        ]);
        assert_eq!(failed.max, 4);
        assert_eq!(failed.outcome_count(), 2);
        assert_eq!(failed.into_result().unwrap_err().kind(), ErrorKind::Aggregate);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// k failing tables never hide the maximum of the N-k successes and
        /// always yield exactly k failures.
        #[test]
        fn prop_partial_failure_keeps_successful_max(
            tables in prop::collection::vec((0i64..1_000_000, any::<bool>()), 0..12)
        ) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            let mut db = InMemoryDatabase::new();
            for (i, (max, fails)) in tables.iter().enumerate() {
                let mut table = InMemoryTable::new(format!("t{}", i)).auto_increment("id", Some(*max));
                if *fails {
                    table = table.fail_describe("injected");
                }
                db = db.with_table(table);
            }

            let outcome = runtime
                .block_on(aggregator(db).collect())
                .unwrap();

            let expected_max = tables
                .iter()
                .filter(|(_, fails)| !fails)
                .map(|(max, _)| *max)
                .max()
                .unwrap_or(0);
            let expected_failures = tables.iter().filter(|(_, fails)| *fails).count();

            prop_assert_eq!(outcome.max, expected_max);
            prop_assert_eq!(outcome.outcome_count(), tables.len());
            prop_assert_eq!(outcome.error.as_ref().map_or(0, FailureSet::len), expected_failures);
            prop_assert_eq!(outcome.error.is_some(), expected_failures > 0);
        }
    }
}
