//! Policy Request Worker
//!
//! Consumes lifecycle events and drives policy requests to their outcome.
//!
//! Inbound events are rows in `workflow_messages`. Producers publish them
//! through `PostgresEventChannel` (for instance from a `RequestIntake` built
//! on the same database) or insert them directly:
//!
//! ```sql
//! INSERT INTO workflow_messages (id, topic, payload)
//! VALUES (gen_random_uuid(), 'payment.confirmed', '{"event_type": "PAYMENT_CONFIRMED", ...}');
//! ```
//!
//! Events the workflow emits go to the same table, so several workers can
//! share one database.
//!
//! # Usage
//!
//! ```bash
//! WORKFLOW_DATABASE_URL=postgres://localhost/policy_requests cargo run --bin policy-request-worker
//! ```
//!
//! # Environment Variables
//!
//! * `WORKFLOW_DATABASE_URL` - PostgreSQL connection string
//! * `WORKFLOW_LOG_LEVEL` - Filter used when `RUST_LOG` is unset (default: info)
//! * `WORKFLOW_LOG_FORMAT` - `pretty` or `json`
//! * `WORKFLOW_GATEWAY_BASE_URL` - Fraud API base URL; unset uses the in-process gateway
//! * `WORKFLOW_GATEWAY_API_KEY` - Bearer token for the fraud API
//! * `WORKFLOW_GATEWAY_TIMEOUT_MS` - Classification timeout (default: 2000)
//! * `WORKFLOW_WORKER_CONCURRENCY` - Workers per topic (default: 8)
//! * `WORKFLOW_MAX_DELIVERY_ATTEMPTS` - Deliveries before dead-lettering (default: 5)
//! * `WORKFLOW_CHANNEL_POLL_INTERVAL_MS` - Idle wait between claims (default: 500)
//! * `WORKFLOW_CHANNEL_VISIBILITY_TIMEOUT_MS` - Claim lease before redelivery (default: 30000)
//! * `WORKFLOW_MESSAGE_RETENTION_HOURS` - Age at which acknowledged messages are purged (default: 168)
//! * `WORKFLOW_SHUTDOWN_TIMEOUT_MS` - Wait for in-flight deliveries on shutdown (default: 10000)

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_request::adapters::{FraudApiConfig, FraudApiGateway, StaticClassificationGateway};
use domain_request::{RequestStore, RiskClassification, RiskClassificationGateway};
use infra_db::{create_pool, run_migrations, PostgresEventChannel, PostgresRequestStore};
use orchestration::{
    subscribe_all, ChannelEventPublisher, OrchestrationService, WorkflowConfig, WorkflowConsumer,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let (config, config_error) = match WorkflowConfig::from_env() {
        Ok(config) => (config, None),
        Err(e) => (WorkflowConfig::default(), Some(e)),
    };

    init_tracing(&config);
    if let Some(e) = config_error {
        tracing::warn!(error = %e, "Invalid WORKFLOW_* settings, using defaults");
    }

    tracing::info!(
        worker_concurrency = config.worker_concurrency,
        remote_gateway = config.uses_remote_gateway(),
        "Starting policy request worker"
    );

    let pool = create_pool(config.database_config())
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("running migrations")?;
    let store: Arc<dyn RequestStore> = Arc::new(PostgresRequestStore::new(pool.clone()));

    let gateway = build_gateway(&config)?;

    let channel = Arc::new(PostgresEventChannel::new(pool, config.channel_config()));
    if let Err(e) = channel.purge_acknowledged(config.message_retention()).await {
        tracing::warn!(error = %e, "Failed to purge acknowledged messages");
    }
    let publisher = Arc::new(ChannelEventPublisher::new(channel.clone()));
    let service = OrchestrationService::new(store, gateway, publisher)
        .with_settings(config.service_settings());
    let consumer = Arc::new(WorkflowConsumer::new(Arc::new(service)));

    subscribe_all(channel.as_ref(), consumer)
        .await
        .context("subscribing consumer")?;
    tracing::info!("Worker ready");

    shutdown_signal().await;

    if !channel.shutdown(config.shutdown_timeout()).await {
        tracing::warn!("Shutdown deadline reached with deliveries in flight");
    }
    tracing::info!("Worker shutdown complete");
    Ok(())
}

fn init_tracing(config: &WorkflowConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_json_logging() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

fn build_gateway(config: &WorkflowConfig) -> anyhow::Result<Arc<dyn RiskClassificationGateway>> {
    if !config.uses_remote_gateway() {
        tracing::warn!("No fraud API configured, classifying every customer as REGULAR");
        return Ok(Arc::new(StaticClassificationGateway::new(RiskClassification::Regular)));
    }

    let gateway = FraudApiGateway::new(FraudApiConfig {
        base_url: config.gateway_base_url.clone(),
        api_key: config.gateway_api_key.clone(),
        timeout_ms: config.gateway_timeout_ms,
        ..Default::default()
    })
    .context("building fraud API client")?;

    tracing::info!(base_url = gateway.base_url(), "Using fraud API gateway");
    Ok(Arc::new(gateway))
}

/// Waits for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, draining"),
        _ = terminate => tracing::info!("Received SIGTERM, draining"),
    }
}
