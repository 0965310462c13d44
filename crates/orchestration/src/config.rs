//! Worker configuration
//!
//! Read from `WORKFLOW_*` environment variables; anything unset keeps its
//! development default.

use std::time::Duration;

use infra_db::{DatabaseConfig, PostgresChannelConfig};
use infra_messaging::RedeliveryPolicy;
use serde::Deserialize;

use crate::service::ServiceSettings;

/// Worker configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// PostgreSQL connection string
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_acquire_timeout_ms: u64,
    /// Fallback filter when `RUST_LOG` is unset
    pub log_level: String,
    /// `json` or `pretty`
    pub log_format: String,
    /// Fraud API base URL; empty selects the in-process classification gateway
    pub gateway_base_url: String,
    pub gateway_api_key: Option<String>,
    pub gateway_timeout_ms: u64,
    /// Workers per subscribed topic
    pub worker_concurrency: usize,
    pub max_delivery_attempts: u32,
    pub redelivery_initial_delay_ms: u64,
    pub redelivery_max_delay_ms: u64,
    /// Idle wait between claims on an empty topic
    pub channel_poll_interval_ms: u64,
    /// How long a claimed message stays hidden before another worker may take it
    pub channel_visibility_timeout_ms: u64,
    /// Acknowledged messages older than this are purged at startup
    pub message_retention_hours: u64,
    /// How long shutdown waits for in-flight deliveries
    pub shutdown_timeout_ms: u64,
    /// Re-reads allowed after losing a conditioned write
    pub max_conflict_retries: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/policy_requests".to_string(),
            database_max_connections: 10,
            database_acquire_timeout_ms: 5000,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            gateway_base_url: String::new(),
            gateway_api_key: None,
            gateway_timeout_ms: 2000,
            worker_concurrency: 8,
            max_delivery_attempts: 5,
            redelivery_initial_delay_ms: 200,
            redelivery_max_delay_ms: 10_000,
            channel_poll_interval_ms: 500,
            channel_visibility_timeout_ms: 30_000,
            message_retention_hours: 168,
            shutdown_timeout_ms: 10_000,
            max_conflict_retries: 5,
        }
    }
}

impl WorkflowConfig {
    /// Loads configuration from the environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("WORKFLOW").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database_url)
            .max_connections(self.database_max_connections)
            .acquire_timeout(Duration::from_millis(self.database_acquire_timeout_ms))
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn uses_remote_gateway(&self) -> bool {
        !self.gateway_base_url.trim().is_empty()
    }

    pub fn is_json_logging(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    pub fn redelivery_policy(&self) -> RedeliveryPolicy {
        RedeliveryPolicy::builder()
            .max_attempts(self.max_delivery_attempts)
            .initial_delay(Duration::from_millis(self.redelivery_initial_delay_ms))
            .max_delay(Duration::from_millis(self.redelivery_max_delay_ms))
            .build()
    }

    pub fn channel_config(&self) -> PostgresChannelConfig {
        PostgresChannelConfig {
            worker_concurrency: self.worker_concurrency,
            redelivery: self.redelivery_policy(),
            poll_interval: Duration::from_millis(self.channel_poll_interval_ms),
            visibility_timeout: Duration::from_millis(self.channel_visibility_timeout_ms),
        }
    }

    pub fn message_retention(&self) -> Duration {
        Duration::from_secs(self.message_retention_hours * 3600)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            gateway_timeout: self.gateway_timeout(),
            max_conflict_retries: self.max_conflict_retries,
        }
    }
}
