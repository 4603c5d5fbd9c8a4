//! Service configuration.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The file path
//! defaults to `config.yaml` but can be given with the `-f` flag or the `CBSCHED_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Sources are merged in this order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `CBSCHED_` override YAML values
//! 3. **Legacy variables** - `GCP_CLOUD_TASKS_QUEUE` sets `task_queue` and
//!    `WXCXT_TASK_HANDLER_URL` sets `task_handler_url`
//!
//! Nested values use double underscores, e.g. `CBSCHED_QUEUE_BACKEND__TYPE=memory`.
//!
//! ## Required Settings
//!
//! `task_queue` and `task_handler_url` are required to fulfill requests, but the service still
//! starts without them: every request re-checks them and fails with a configuration error while
//! they are absent.
//!
//! ```bash
//! GCP_CLOUD_TASKS_QUEUE="projects/my-project/locations/us-central1/queues/scheduled-callback"
//! WXCXT_TASK_HANDLER_URL="https://hooks.us.webexconnect.io/events/ABCDEFGH"
//! CBSCHED_PORT=8080
//! ```

use chrono::FixedOffset;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Public Cloud Tasks API endpoint
pub const DEFAULT_CLOUD_TASKS_ENDPOINT: &str = "https://cloudtasks.googleapis.com";

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "CBSCHED_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Fully qualified queue that receives callback tasks
    /// (`projects/{project}/locations/{location}/queues/{queue}`)
    pub task_queue: Option<String>,
    /// Downstream URL each scheduled task calls
    pub task_handler_url: Option<String>,
    /// UTC offset the caller's `scheduledTime` is expressed in
    #[serde(with = "utc_offset")]
    pub schedule_utc_offset: FixedOffset,
    /// Task queue backend
    pub queue_backend: QueueBackendConfig,
    /// Expose Prometheus metrics at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Task queue backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueBackendConfig {
    /// Google Cloud Tasks
    CloudTasks(CloudTasksConfig),
    /// In-process recording queue for tests and local runs. Tasks never fire and only the
    /// most recent submissions are kept.
    Memory,
}

impl QueueBackendConfig {
    /// Backend name as written in configuration
    pub fn name(&self) -> &'static str {
        match self {
            QueueBackendConfig::CloudTasks(_) => "cloud_tasks",
            QueueBackendConfig::Memory => "memory",
        }
    }
}

impl Default for QueueBackendConfig {
    fn default() -> Self {
        QueueBackendConfig::CloudTasks(CloudTasksConfig::default())
    }
}

/// Google Cloud Tasks client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CloudTasksConfig {
    /// Base URL of the Cloud Tasks API (override for emulators)
    pub api_endpoint: String,
    /// Static bearer token. When unset, ambient Google credentials are used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// HTTP timeout for task creation calls
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CloudTasksConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_CLOUD_TASKS_ENDPOINT.to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Serde adapter for `FixedOffset` written as `+HH:MM` / `-HH:MM`.
mod utc_offset {
    use chrono::FixedOffset;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(offset: &FixedOffset, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(offset)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FixedOffset, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        s.parse::<FixedOffset>()
            .map_err(|e| serde::de::Error::custom(format!("invalid UTC offset '{s}' (expected e.g. -05:00): {e}")))
    }
}

/// Eastern Standard Time, the offset contact-center callback times have always used
pub fn default_schedule_offset() -> FixedOffset {
    FixedOffset::west_opt(5 * 60 * 60).expect("-05:00 is a valid UTC offset")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            task_queue: None,
            task_handler_url: None,
            schedule_utc_offset: default_schedule_offset(),
            queue_backend: QueueBackendConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate settings that would make the service unusable for every request.
    ///
    /// Missing `task_queue`/`task_handler_url` is deliberately not checked here; see
    /// [`Config::task_queue`].
    pub fn validate(&self) -> Result<(), Error> {
        if let QueueBackendConfig::CloudTasks(cloud_tasks) = &self.queue_backend {
            if let Err(e) = Url::parse(&cloud_tasks.api_endpoint) {
                return Err(Error::Configuration {
                    message: format!(
                        "Config validation: queue_backend.api_endpoint '{}' is not a valid URL: {e}",
                        cloud_tasks.api_endpoint
                    ),
                });
            }
            if cloud_tasks.timeout.is_zero() {
                return Err(Error::Configuration {
                    message: "Config validation: queue_backend.timeout must be greater than zero".to_string(),
                });
            }
        }

        if let Some(url) = self.task_handler_url.as_deref().filter(|url| !url.is_empty())
            && let Err(e) = Url::parse(url)
        {
            return Err(Error::Configuration {
                message: format!("Config validation: task_handler_url '{url}' is not a valid URL: {e}"),
            });
        }

        Ok(())
    }

    /// The configured queue, or a configuration error when absent or empty
    pub fn task_queue(&self) -> Result<&str, Error> {
        required_setting(self.task_queue.as_deref(), "task_queue (GCP_CLOUD_TASKS_QUEUE)")
    }

    /// The configured task handler URL, or a configuration error when absent or empty
    pub fn task_handler_url(&self) -> Result<&str, Error> {
        required_setting(self.task_handler_url.as_deref(), "task_handler_url (WXCXT_TASK_HANDLER_URL)")
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables override specific values
            .merge(Env::prefixed("CBSCHED_").ignore(&["config"]).split("__"))
            // Variable names used by existing deployments
            .merge(
                Env::raw()
                    .only(&["GCP_CLOUD_TASKS_QUEUE"])
                    .map(|_| "task_queue".into()),
            )
            .merge(
                Env::raw()
                    .only(&["WXCXT_TASK_HANDLER_URL"])
                    .map(|_| "task_handler_url".into()),
            )
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn required_setting<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, Error> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::Configuration {
            message: format!("missing {name}"),
        }),
    }
}
