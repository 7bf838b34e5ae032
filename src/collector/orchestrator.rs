//! Collection Orchestrator
//!
//! Runs one collection-and-publish cycle: every registered fetcher runs in
//! its own task, every sample it produces is published to the sink (partial
//! ones included), and every failure is attributed to its fetcher and
//! accumulated.
//!
//! Tasks live in a `JoinSet`: each reports its slot exactly once, a task
//! that panics leaves its slot empty and is reported as `Internal`, and
//! dropping the cycle aborts whatever is still running.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use super::fetcher::FetcherRegistry;
use crate::domain::ports::{FetchOutcome, MetricFetcher, MetricSample, MetricSink};
use crate::error::{Error, FailureSet, Result};

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for one fetcher task, fetch and publish combined
    pub task_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(120),
        }
    }
}

/// Result of one collection cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Samples that were fetched and accepted by the sink
    pub published: Vec<MetricSample>,
    /// One entry per fetcher that failed at fetch or publish, or whose
    /// published sample was computed from a subset of its sources
    pub failures: FailureSet,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Published samples if every fetcher succeeded, otherwise the combined failure.
    pub fn into_result(self) -> Result<Vec<MetricSample>> {
        self.failures.into_result()?;
        Ok(self.published)
    }
}

/// Runs every registered fetcher and publishes what they produce.
pub struct CollectionOrchestrator {
    registry: FetcherRegistry,
    sink: Arc<dyn MetricSink>,
    config: OrchestratorConfig,
}

impl CollectionOrchestrator {
    pub fn new(
        registry: FetcherRegistry,
        sink: Arc<dyn MetricSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            sink,
            config,
        }
    }

    pub fn registry(&self) -> &FetcherRegistry {
        &self.registry
    }

    /// Run one cycle and wait for every fetcher task to finish.
    #[instrument(skip(self), fields(fetchers = self.registry.len()))]
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        let start = Instant::now();

        let names: Vec<String> = self.registry.names().into_iter().map(str::to_string).collect();

        let mut tasks = JoinSet::new();
        for (index, fetcher) in self.registry.iter().enumerate() {
            tasks.spawn(fetcher_task(
                index,
                fetcher.clone(),
                self.sink.clone(),
                self.config.task_timeout,
            ));
        }

        let mut slots: Vec<Option<TaskOutcome>> =
            std::iter::repeat_with(|| None).take(names.len()).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    if let Some(slot) = slots.get_mut(index) {
                        *slot = Some(outcome);
                    }
                }
                Err(e) => error!("Fetcher task did not complete: {}", e),
            }
        }

        let mut published = Vec::new();
        let mut failures = FailureSet::new();
        for (name, slot) in names.into_iter().zip(slots) {
            match slot {
                Some(TaskOutcome { published: sample, failure }) => {
                    published.extend(sample);
                    if let Some(e) = failure {
                        failures.push(name, e);
                    }
                }
                None => failures.push(
                    name,
                    Error::Internal("fetcher task did not complete".to_string()),
                ),
            }
        }

        let report = CycleReport {
            started_at,
            elapsed: start.elapsed(),
            published,
            failures,
        };

        info!(
            published = report.published.len(),
            failed = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Collection cycle finished"
        );

        report
    }

    /// Run one cycle and fold it into a single result.
    pub async fn run_once(&self) -> Result<Vec<MetricSample>> {
        self.run_cycle().await.into_result()
    }
}

impl std::fmt::Debug for CollectionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionOrchestrator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// What one fetcher task left behind. A partial sample yields both.
#[derive(Debug, Default)]
struct TaskOutcome {
    published: Option<MetricSample>,
    failure: Option<Error>,
}

impl TaskOutcome {
    fn failed(error: Error) -> Self {
        Self {
            published: None,
            failure: Some(error),
        }
    }
}

async fn fetcher_task(
    index: usize,
    fetcher: Arc<dyn MetricFetcher>,
    sink: Arc<dyn MetricSink>,
    deadline: Duration,
) -> (usize, TaskOutcome) {
    let name = fetcher.name().to_string();
    let outcome = match timeout(deadline, fetch_and_publish(fetcher.as_ref(), sink.as_ref())).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(fetcher = %name, "Fetcher timed out after {:?}", deadline);
            TaskOutcome::failed(Error::Timeout {
                worker: format!("fetcher {}", name),
                duration: deadline,
            })
        }
    };
    (index, outcome)
}

async fn fetch_and_publish(fetcher: &dyn MetricFetcher, sink: &dyn MetricSink) -> TaskOutcome {
    let FetchOutcome {
        sample,
        partial_failures,
    } = match fetcher.fetch().await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(fetcher = %fetcher.name(), error = %e, "Fetch failed");
            return TaskOutcome::failed(e);
        }
    };

    debug!(
        fetcher = %fetcher.name(),
        namespace = %sample.namespace,
        metric = %sample.metric_name,
        value = sample.value,
        partial = partial_failures.is_some(),
        "Publishing sample"
    );

    match sink.publish(&sample).await {
        Ok(()) => TaskOutcome {
            published: Some(sample),
            failure: partial_failures.map(Error::Aggregate),
        },
        Err(e) => {
            warn!(fetcher = %fetcher.name(), error = %e, "Publish failed");
            let failure = match partial_failures {
                None => e,
                Some(mut failures) => {
                    failures.push("sink", e);
                    Error::Aggregate(failures)
                }
            };
            TaskOutcome::failed(failure)
        }
    }
}
