//! Metric Sink Adapters
//!
//! Implements the `MetricSink` port with local backends.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::ports::{MetricSample, MetricSink};
use crate::error::{Error, Result};

/// Logging-based metric sink.
///
/// Writes every sample to the tracing/logging system. Used when no remote
/// sink is configured.
#[derive(Debug, Clone, Default)]
pub struct LoggingSink {
    /// Whether to log samples at info level (true) or debug level (false)
    info_level: bool,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that logs at info level.
    pub fn info_level() -> Self {
        Self { info_level: true }
    }

    /// Create a sink that logs at debug level.
    pub fn debug_level() -> Self {
        Self { info_level: false }
    }
}

#[async_trait]
impl MetricSink for LoggingSink {
    async fn publish(&self, sample: &MetricSample) -> Result<()> {
        let dimensions =
            serde_json::to_string(&sample.dimensions).unwrap_or_else(|_| format!("{:?}", sample.dimensions));

        if self.info_level {
            info!(
                namespace = %sample.namespace,
                metric = %sample.metric_name,
                value = sample.value,
                unit = %sample.unit,
                dimensions = %dimensions,
                "Metric sample"
            );
        } else {
            debug!(
                namespace = %sample.namespace,
                metric = %sample.metric_name,
                value = sample.value,
                unit = %sample.unit,
                dimensions = %dimensions,
                "Metric sample"
            );
        }

        Ok(())
    }
}

/// In-memory metric sink for testing.
///
/// Records samples exactly as received for later inspection.
#[derive(Debug, Default)]
pub struct InMemorySink {
    samples: RwLock<Vec<MetricSample>>,
    rejection: RwLock<Option<String>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent publish with `reason`.
    pub fn reject_publishes(&self, reason: &str) {
        *self.rejection.write() = Some(reason.to_string());
    }

    /// All recorded samples.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.read().clone()
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    pub fn clear(&self) {
        self.samples.write().clear();
    }

    /// Samples published under `namespace`.
    pub fn samples_in(&self, namespace: &str) -> Vec<MetricSample> {
        self.samples
            .read()
            .iter()
            .filter(|s| s.namespace == namespace)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricSink for InMemorySink {
    async fn publish(&self, sample: &MetricSample) -> Result<()> {
        if let Some(reason) = self.rejection.read().clone() {
            return Err(Error::Publish(reason));
        }
        self.samples.write().push(sample.clone());
        Ok(())
    }
}
