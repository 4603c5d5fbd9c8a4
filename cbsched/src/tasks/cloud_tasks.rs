//! Google Cloud Tasks backend.
//!
//! Creates HTTP-target tasks through the Cloud Tasks v2 REST API:
//!
//! ```text
//! POST {api_endpoint}/v2/{queue}/tasks
//! {
//!   "task": {
//!     "httpRequest": { "url", "httpMethod", "headers", "body" },
//!     "scheduleTime": "2023-01-15T19:30:00Z"
//!   }
//! }
//! ```
//!
//! `queue` is the fully qualified queue path
//! (`projects/{project}/locations/{location}/queues/{queue}`). Requests are authorized with a
//! bearer token: either the static `access_token` from configuration (emulators, local testing)
//! or ambient Google credentials discovered through `gcp_auth` on first use.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use url::Url;

use super::{HttpTask, Result, TaskHandle, TaskQueue, TaskQueueError};
use crate::config::CloudTasksConfig;

const CLOUD_TASKS_SCOPE: &str = "https://www.googleapis.com/auth/cloud-tasks";

/// Cloud Tasks API request body for creating a task.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest<'a> {
    task: CloudTask<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CloudTask<'a> {
    http_request: HttpRequest<'a>,
    schedule_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpRequest<'a> {
    url: &'a str,
    http_method: &'a str,
    headers: &'a BTreeMap<String, String>,
    /// Already base64 encoded
    body: &'a str,
}

/// Success body. The API always names created tasks; a missing name is reported as "no task".
#[derive(Debug, Deserialize)]
struct CreatedTask {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    message: String,
    #[serde(default)]
    status: String,
}

enum AccessToken {
    Static(String),
    Ambient(OnceCell<Arc<dyn gcp_auth::TokenProvider>>),
}

/// Google Cloud Tasks queue client.
pub struct CloudTasksQueue {
    api_endpoint: Url,
    access_token: AccessToken,
    client: reqwest::Client,
}

impl std::fmt::Debug for CloudTasksQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = match self.access_token {
            AccessToken::Static(_) => "<static>",
            AccessToken::Ambient(_) => "<ambient>",
        };
        f.debug_struct("CloudTasksQueue")
            .field("api_endpoint", &self.api_endpoint.as_str())
            .field("access_token", &token)
            .finish()
    }
}

impl CloudTasksQueue {
    /// Create a new Cloud Tasks client. Ambient credentials are resolved lazily, so this never
    /// touches the network.
    pub fn new(config: CloudTasksConfig) -> Result<Self> {
        let api_endpoint = Url::parse(&config.api_endpoint)
            .map_err(|e| TaskQueueError::Configuration(format!("invalid api_endpoint '{}': {e}", config.api_endpoint)))?;

        if config.timeout.is_zero() {
            return Err(TaskQueueError::Configuration("timeout must be greater than zero".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TaskQueueError::Configuration(format!("failed to create HTTP client: {e}")))?;

        let access_token = match config.access_token {
            Some(token) if !token.is_empty() => AccessToken::Static(token),
            _ => AccessToken::Ambient(OnceCell::new()),
        };

        Ok(Self {
            api_endpoint,
            access_token,
            client,
        })
    }

    fn tasks_url(&self, queue: &str) -> String {
        format!("{}/v2/{}/tasks", self.api_endpoint.as_str().trim_end_matches('/'), queue.trim_matches('/'))
    }

    async fn bearer_token(&self) -> Result<String> {
        match &self.access_token {
            AccessToken::Static(token) => Ok(token.clone()),
            AccessToken::Ambient(provider) => {
                let provider = provider
                    .get_or_try_init(|| async { gcp_auth::provider().await })
                    .await
                    .map_err(|e| TaskQueueError::Authentication(format!("failed to initialize GCP credentials: {e}")))?;

                let token = provider
                    .token(&[CLOUD_TASKS_SCOPE])
                    .await
                    .map_err(|e| TaskQueueError::Authentication(format!("failed to get GCP access token: {e}")))?;

                Ok(token.as_str().to_string())
            }
        }
    }
}

#[async_trait]
impl TaskQueue for CloudTasksQueue {
    #[tracing::instrument(skip_all, fields(queue = %queue))]
    async fn create_task(&self, queue: &str, task: HttpTask) -> Result<Option<TaskHandle>> {
        let request = CreateTaskRequest {
            task: CloudTask {
                http_request: HttpRequest {
                    url: &task.url,
                    http_method: &task.http_method,
                    headers: &task.headers,
                    body: &task.body,
                },
                schedule_time: task.schedule_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        };

        let token = self.bearer_token().await?;
        let api_url = self.tasks_url(queue);
        tracing::debug!(%api_url, schedule_time = %request.task.schedule_time, "Submitting Cloud Task");

        let response = self
            .client
            .post(&api_url)
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| TaskQueueError::Transport(format!("Cloud Tasks API request failed: {e}")))?;

        let status = response.status();

        if status.is_success() {
            let created: CreatedTask = response
                .json()
                .await
                .map_err(|e| TaskQueueError::QueueApi(format!("failed to parse create task response: {e}")))?;

            return Ok(created.name.filter(|name| !name.is_empty()).map(|name| TaskHandle { name }));
        }

        let error_body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());

        if let Ok(error_response) = serde_json::from_str::<GoogleErrorResponse>(&error_body) {
            return Err(TaskQueueError::QueueApi(format!(
                "{} ({})",
                error_response.error.message, error_response.error.status
            )));
        }

        Err(TaskQueueError::QueueApi(format!("{status} - {error_body}")))
    }

    fn backend_name(&self) -> &'static str {
        "cloud_tasks"
    }
}
