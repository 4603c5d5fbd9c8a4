//! Test utilities shared by handler and application tests.

use crate::config::{Config, QueueBackendConfig};
use crate::tasks::TaskQueue;
use axum_test::TestServer;
use serde_json::json;
use std::sync::Arc;

pub const TEST_TASK_QUEUE: &str = "projects/test/locations/us-central1/queues/scheduled-callback";
pub const TEST_TASK_HANDLER_URL: &str = "https://hooks.example.com/events/callback";

pub fn create_test_config() -> Config {
    Config {
        task_queue: Some(TEST_TASK_QUEUE.to_string()),
        task_handler_url: Some(TEST_TASK_HANDLER_URL.to_string()),
        queue_backend: QueueBackendConfig::Memory,
        // The Prometheus layer installs a process-wide recorder
        enable_metrics: false,
        ..Default::default()
    }
}

pub fn create_test_app(config: Config, task_queue: Arc<dyn TaskQueue>) -> TestServer {
    crate::Application::with_task_queue(config, task_queue)
        .expect("Failed to create application")
        .into_test_server()
}

/// A fulfillment request body as the contact-center flow sends it
pub fn callback_body(scheduled_time: &str, queue_id: &str, ani: &str) -> serde_json::Value {
    json!({
        "scheduledTime": scheduled_time,
        "interaction": {
            "callProcessingDetails": {
                "queueId": queue_id,
                "ani": ani
            }
        }
    })
}
