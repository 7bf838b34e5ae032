//! Prometheus Pushgateway Sink Adapter
//!
//! Implements the `MetricSink` port by pushing each sample as a gauge to a
//! Prometheus Pushgateway. The sample namespace becomes the job and the
//! dimensions become the grouping key.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::domain::ports::{MetricSample, MetricSink};
use crate::error::{Error, Result};

/// Configuration for the Pushgateway sink
#[derive(Debug, Clone)]
pub struct PushgatewayConfig {
    /// Pushgateway base URL
    pub url: String,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for PushgatewayConfig {
    fn default() -> Self {
        Self {
            url: "http://pushgateway.monitoring.svc.cluster.local:9091".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Pushes samples to a Prometheus Pushgateway.
pub struct PushgatewaySink {
    config: PushgatewayConfig,
    client: Client,
}

impl PushgatewaySink {
    pub fn new(config: PushgatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Grouping-key URL for a sample.
    pub fn push_url(&self, sample: &MetricSample) -> String {
        let mut url = format!(
            "{}/metrics/job/{}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&sanitize_name(&sample.namespace))
        );
        for (name, value) in &sample.dimensions {
            push_label(&mut url, &sanitize_name(name), value);
        }
        url
    }
}

impl std::fmt::Debug for PushgatewaySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushgatewaySink")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl MetricSink for PushgatewaySink {
    #[instrument(skip(self, sample), fields(metric = %sample.metric_name))]
    async fn publish(&self, sample: &MetricSample) -> Result<()> {
        let body = encode_sample(sample)?;
        let url = self.push_url(sample);

        debug!("Pushing to {}", url);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, prometheus::TEXT_FORMAT)
            .body(body)
            .send()
            .await
            .map_err(Error::PublishTransport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!(
                "Pushgateway returned {} for {}/{}: {}",
                status,
                sample.namespace,
                sample.metric_name,
                detail.trim()
            )));
        }

        Ok(())
    }
}

/// Append one grouping-key label. Values that are empty or contain `/`
/// cannot be a path segment and use the `@base64` form (`=` when empty).
fn push_label(url: &mut String, name: &str, value: &str) {
    url.push('/');
    url.push_str(&urlencoding::encode(name));
    if value.is_empty() {
        url.push_str("@base64/=");
    } else if value.contains('/') {
        url.push_str("@base64/");
        url.push_str(&URL_SAFE_NO_PAD.encode(value));
    } else {
        url.push('/');
        url.push_str(&urlencoding::encode(value));
    }
}

/// Render a sample in the Prometheus text exposition format.
pub fn encode_sample(sample: &MetricSample) -> Result<String> {
    let encode_err = |e: prometheus::Error| {
        Error::Publish(format!(
            "cannot encode {}/{}: {}",
            sample.namespace, sample.metric_name, e
        ))
    };

    let opts = Opts::new(
        sanitize_name(&sample.metric_name),
        format!("{} ({})", sample.metric_name, sample.unit),
    )
    .namespace(sanitize_name(&sample.namespace));

    let gauge = Gauge::with_opts(opts).map_err(encode_err)?;
    gauge.set(sample.value);

    let registry = Registry::new();
    registry.register(Box::new(gauge)).map_err(encode_err)?;

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(encode_err)?;

    String::from_utf8(buffer).map_err(|e| Error::Publish(format!("non-UTF-8 exposition: {}", e)))
}

/// Map a name onto the Prometheus charset `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample() -> MetricSample {
        MetricSample::new("MySql/AutoIncrement", "AutoIncrement", 42.0).with_dimension("DBName", "shop")
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("MySql/AutoIncrement"), "MySql_AutoIncrement");
        assert_eq!(sanitize_name("db-name.x"), "db_name_x");
        assert_eq!(sanitize_name("9lives"), "_9lives");
        assert_eq!(sanitize_name(""), "_");
    }

    #[test]
    fn test_encode_sample() {
        let text = encode_sample(&sample()).unwrap();

        assert!(text.contains("# TYPE MySql_AutoIncrement_AutoIncrement gauge"));
        assert!(text.contains("MySql_AutoIncrement_AutoIncrement 42"));
        assert!(text.contains("AutoIncrement (Count)"));
    }

    #[test]
    fn test_push_url() {
        let sink = PushgatewaySink::new(PushgatewayConfig {
            url: "http://localhost:9091/".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        assert_eq!(
            sink.push_url(&sample()),
            "http://localhost:9091/metrics/job/MySql_AutoIncrement/DBName/shop"
        );
    }

    #[test]
    fn test_push_url_base64_labels() {
        let sink = PushgatewaySink::new(PushgatewayConfig {
            url: "http://localhost:9091".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        let empty = MetricSample::new("MySql/AutoIncrement", "AutoIncrement", 1.0).with_dimension("DBName", "");
        assert_eq!(
            sink.push_url(&empty),
            "http://localhost:9091/metrics/job/MySql_AutoIncrement/DBName@base64/="
        );

        let slashed =
            MetricSample::new("MySql/AutoIncrement", "AutoIncrement", 1.0).with_dimension("DBName", "/var/tmp");
        assert_eq!(
            sink.push_url(&slashed),
            "http://localhost:9091/metrics/job/MySql_AutoIncrement/DBName@base64/L3Zhci90bXA"
        );

        let spaced =
            MetricSample::new("MySql/AutoIncrement", "AutoIncrement", 1.0).with_dimension("DBName", "my db");
        assert_eq!(
            sink.push_url(&spaced),
            "http://localhost:9091/metrics/job/MySql_AutoIncrement/DBName/my%20db"
        );
    }

    #[tokio::test]
    async fn test_unreachable_pushgateway() {
        let sink = PushgatewaySink::new(PushgatewayConfig {
            url: "http://localhost:19999".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        let err = sink.publish(&sample()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Publish);
    }
}
