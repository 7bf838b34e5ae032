//! autoincrement-watch
//!
//! Runs one collection cycle (or one per interval) and reports the highest
//! MySQL auto-increment value to the configured sink.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      autoincrement-watch                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   Fetcher    │───▶│ Orchestrator │───▶│     Sink     │       │
//! │  │  Registry    │    │  (fan-out)   │    │ (Pushgateway │       │
//! │  │              │    │              │    │   or logs)   │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use autoincrement_watch::adapters::{LoggingSink, MySqlClient, PushgatewayConfig, PushgatewaySink};
use autoincrement_watch::collector::{
    AggregatorConfig, AutoIncrementAggregator, AutoIncrementFetcher, AutoIncrementMetricConfig,
    CollectionOrchestrator, EmptyColumnPolicy, FetcherRegistry, OrchestratorConfig,
};
use autoincrement_watch::config::{DatabaseConfig, DatabaseParams};
use autoincrement_watch::domain::{DatabaseClient, MetricSink};
use autoincrement_watch::error::{Error, Result};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Report the highest MySQL auto-increment value to a monitoring sink
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    db: DatabaseParams,

    /// Pushgateway URL (samples are only logged when unset)
    #[arg(long, env = "PUSHGATEWAY_URL")]
    pushgateway_url: Option<String>,

    /// Pushgateway request timeout in seconds
    #[arg(long, env = "PUBLISH_TIMEOUT_SECONDS", default_value = "10")]
    publish_timeout_seconds: u64,

    /// Per-table worker timeout in seconds
    #[arg(long, env = "WORKER_TIMEOUT_SECONDS", default_value = "30")]
    worker_timeout_seconds: u64,

    /// Per-fetcher timeout in seconds (fetch and publish)
    #[arg(long, env = "FETCH_TIMEOUT_SECONDS", default_value = "120")]
    fetch_timeout_seconds: u64,

    /// How an empty auto-increment column is counted
    #[arg(long, env = "EMPTY_TABLE_POLICY", value_enum, default_value_t = EmptyColumnPolicy::Fail)]
    empty_table_policy: EmptyColumnPolicy,

    /// Metric namespace
    #[arg(long, env = "METRIC_NAMESPACE", default_value = "MySql/AutoIncrement")]
    metric_namespace: String,

    /// Metric name
    #[arg(long, env = "METRIC_NAME", default_value = "AutoIncrement")]
    metric_name: String,

    /// Dimension carrying the database name
    #[arg(long, env = "DIMENSION_NAME", default_value = "DBName")]
    dimension_name: String,

    /// Repeat the cycle every N seconds until interrupted (single cycle when unset)
    #[arg(long, env = "INTERVAL_SECONDS")]
    interval_seconds: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let db_config = DatabaseConfig::from_params(args.db.clone())?;

    info!("Starting autoincrement-watch");
    info!("  Database: {}:{}/{}", db_config.host, db_config.port, db_config.database);
    info!("  Worker timeout: {}s", args.worker_timeout_seconds);
    info!("  Empty table policy: {:?}", args.empty_table_policy);

    let db = Arc::new(MySqlClient::connect_lazy(&db_config));

    if let Err(e) = db.ping().await {
        error!("Database health check failed: {}", e);
        error!("Continuing anyway - the cycle will report the failure");
    } else {
        info!("Database connection healthy");
    }

    let aggregator = AutoIncrementAggregator::new(
        db.clone(),
        AggregatorConfig {
            worker_timeout: Duration::from_secs(args.worker_timeout_seconds),
            max_concurrency: db_config.max_connections as usize,
            empty_column_policy: args.empty_table_policy,
        },
    );

    let fetcher = AutoIncrementFetcher::new(
        aggregator,
        AutoIncrementMetricConfig {
            namespace: args.metric_namespace.clone(),
            metric_name: args.metric_name.clone(),
            dimension_name: args.dimension_name.clone(),
            dimension_value: db_config.database.clone(),
        },
    );

    let registry = FetcherRegistry::builder().register(fetcher).build()?;

    let sink: Arc<dyn MetricSink> = match &args.pushgateway_url {
        Some(url) => {
            info!("  Pushgateway URL: {}", url);
            Arc::new(PushgatewaySink::new(PushgatewayConfig {
                url: url.clone(),
                timeout: Duration::from_secs(args.publish_timeout_seconds),
            })?)
        }
        None => {
            warn!("No Pushgateway configured - samples will only be logged");
            Arc::new(LoggingSink::info_level())
        }
    };

    let orchestrator = CollectionOrchestrator::new(
        registry,
        sink,
        OrchestratorConfig {
            task_timeout: Duration::from_secs(args.fetch_timeout_seconds),
        },
    );

    let result = match args.interval_seconds {
        None => run_single(&orchestrator).await,
        Some(secs) => {
            run_periodic(&orchestrator, Duration::from_secs(secs.max(1))).await;
            Ok(())
        }
    };

    db.close().await;
    info!("Shutdown complete");
    result
}

// =============================================================================
// Cycle Runners
// =============================================================================

async fn run_single(orchestrator: &CollectionOrchestrator) -> Result<()> {
    let report = tokio::select! {
        report = orchestrator.run_cycle() => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, abandoning the cycle");
            return Err(Error::Internal("interrupted before the cycle finished".to_string()));
        }
    };

    for sample in &report.published {
        info!(
            "Published {}/{} = {}",
            sample.namespace, sample.metric_name, sample.value
        );
    }

    report.into_result().map(|_| ()).map_err(|e| {
        error!("Collection cycle failed: {}", e);
        e
    })
}

async fn run_periodic(orchestrator: &CollectionOrchestrator, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    info!("Running a cycle every {:?}", period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut interrupt => {
                info!("Interrupt received, stopping");
                break;
            }
        }

        // Dropping an unfinished cycle aborts its fetcher and table tasks.
        tokio::select! {
            report = orchestrator.run_cycle() => {
                if let Err(e) = report.into_result() {
                    error!("Collection cycle failed: {}", e);
                }
            }
            _ = &mut interrupt => {
                info!("Interrupt received, abandoning the running cycle");
                break;
            }
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["sqlx=warn", "hyper=warn", "reqwest=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
