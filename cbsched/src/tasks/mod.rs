//! Task queue abstraction layer
//!
//! This module defines the `TaskQueue` trait, the capability the fulfillment handler uses to
//! schedule a deferred HTTP call. Durability, retries, and delivery belong to the queue backend;
//! this crate only describes the task and submits it once.
//!
//! - [`cloud_tasks`]: Google Cloud Tasks v2 REST backend (production)
//! - [`memory`]: In-process recording backend for tests and local runs

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::QueueBackendConfig;

pub mod cloud_tasks;
pub mod memory;

pub use cloud_tasks::CloudTasksQueue;
pub use memory::InMemoryTaskQueue;

/// Create a task queue from configuration
///
/// This is the single point where configuration turns into a backend instance.
pub fn create_task_queue(config: &QueueBackendConfig) -> Result<Arc<dyn TaskQueue>> {
    match config {
        QueueBackendConfig::CloudTasks(cloud_tasks_config) => Ok(Arc::new(CloudTasksQueue::new(cloud_tasks_config.clone())?)),
        QueueBackendConfig::Memory => Ok(Arc::new(InMemoryTaskQueue::new())),
    }
}

/// Result type for task queue operations
pub type Result<T> = std::result::Result<T, TaskQueueError>;

/// Errors that can occur while submitting a task
#[derive(Debug, thiserror::Error)]
pub enum TaskQueueError {
    #[error("Task queue configuration error: {0}")]
    Configuration(String),

    #[error("Task queue authentication error: {0}")]
    Authentication(String),

    #[error("Task queue API error: {0}")]
    QueueApi(String),

    #[error("Task queue request failed: {0}")]
    Transport(String),
}

/// A deferred HTTP request, ready to hand to a task queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTask {
    /// URL the queue will call when the task fires
    pub url: String,
    /// HTTP method of the deferred call
    pub http_method: String,
    /// Headers sent with the deferred call
    pub headers: BTreeMap<String, String>,
    /// Base64 (standard alphabet) encoded request body
    pub body: String,
    /// Earliest time the queue may dispatch the call
    pub schedule_time: DateTime<Utc>,
}

impl HttpTask {
    /// Build a POST task carrying `payload` as a JSON body, scheduled for `schedule_time`.
    pub fn post_json<T: Serialize>(url: impl Into<String>, payload: &T, schedule_time: DateTime<Utc>) -> serde_json::Result<Self> {
        let json = serde_json::to_vec(payload)?;
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        Ok(Self {
            url: url.into(),
            http_method: "POST".to_string(),
            headers,
            body: base64::engine::general_purpose::STANDARD.encode(json),
            schedule_time,
        })
    }

    /// Scheduled execution time in epoch seconds
    pub fn schedule_seconds(&self) -> i64 {
        self.schedule_time.timestamp()
    }

    /// Decode the body back into raw bytes
    pub fn decoded_body(&self) -> std::result::Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.body)
    }
}

/// Reference to a task the queue accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    /// Fully qualified task name assigned by the queue
    pub name: String,
}

/// Abstract task queue interface
///
/// Implementors submit a single task per call and never retry internally. Backends signal a
/// hard failure with `Err`; `Ok(None)` means the call completed but the backend reported no
/// created task.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Submit `task` to the queue identified by `queue`
    async fn create_task(&self, queue: &str, task: HttpTask) -> Result<Option<TaskHandle>>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}
