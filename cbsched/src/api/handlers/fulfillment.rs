use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{
        Method, StatusCode,
        header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS},
    },
    response::{IntoResponse, Response},
};
use metrics::counter;

use crate::{
    AppState,
    api::models::fulfillment::{FulfillmentRequest, FulfillmentResponse},
    callback::{self, CallbackRequest},
    errors::{Error, Result},
};

const PREFLIGHT_ALLOW_METHODS: &str = "GET, POST";
const PREFLIGHT_ALLOW_HEADERS: &str = "Content-Type, Accept";

/// Schedule a callback.
///
/// Validates the callback request and enqueues a deferred task that posts
/// `{queueId, callbackNumber}` to the configured handler at `scheduledTime`. Every outcome is
/// reported as `{retval, retmsg}`.
#[utoipa::path(
    post,
    path = "/",
    tag = "fulfillment",
    summary = "Schedule a callback",
    request_body = FulfillmentRequest,
    responses(
        (status = 200, description = "Task created (retval 0)", body = FulfillmentResponse),
        (status = 204, description = "CORS preflight (OPTIONS)"),
        (status = 400, description = "Missing scheduledTime, queueId or ani (retval 1)", body = FulfillmentResponse),
        (status = 500, description = "Configuration failure or unhandled error (retval -1), or no task created (retval 2)", body = FulfillmentResponse),
    )
)]
#[tracing::instrument(skip_all, fields(method = %method))]
pub async fn handle_fulfillment(State(state): State<AppState>, method: Method, body: Bytes) -> Result<Response> {
    // Checked per request so a misconfigured deployment still answers every call
    let queue = state.config.task_queue()?;
    let handler_url = state.config.task_handler_url()?;
    tracing::debug!(queue, handler_url, "Configuration present");

    if method == Method::OPTIONS {
        return Ok((
            StatusCode::NO_CONTENT,
            [
                (ACCESS_CONTROL_ALLOW_METHODS, PREFLIGHT_ALLOW_METHODS),
                (ACCESS_CONTROL_ALLOW_HEADERS, PREFLIGHT_ALLOW_HEADERS),
            ],
            Json(FulfillmentResponse::ok("OPTIONS processed.")),
        )
            .into_response());
    }

    let request = CallbackRequest::from_body(&body)?;
    let task = callback::build_task(&request, handler_url, state.config.schedule_utc_offset)?;
    let schedule_time = task.schedule_time;

    let created = state.task_queue.create_task(queue, task).await?;
    let Some(handle) = created else {
        return Err(Error::TaskNotCreated);
    };

    tracing::info!(
        task = %handle.name,
        queue_id = %request.queue_id,
        %schedule_time,
        backend = state.task_queue.backend_name(),
        "Created callback task"
    );
    counter!("cbsched_tasks_created_total").increment(1);

    Ok((StatusCode::OK, Json(FulfillmentResponse::ok("Task created successfully."))).into_response())
}

#[cfg(test)]
mod tests {
    use crate::{
        api::models::fulfillment::FulfillmentResponse,
        config::Config,
        tasks::{HttpTask, InMemoryTaskQueue, TaskHandle, TaskQueue, TaskQueueError},
        test_utils::{callback_body, create_test_app, create_test_config},
    };
    use async_trait::async_trait;
    use axum::http::{Method, StatusCode};
    use base64::Engine;
    use serde_json::json;
    use std::sync::Arc;

    fn memory_app(config: Config) -> (axum_test::TestServer, Arc<InMemoryTaskQueue>) {
        let queue = Arc::new(InMemoryTaskQueue::new());
        (create_test_app(config, queue.clone()), queue)
    }

    fn assert_acao(response: &axum_test::TestResponse) {
        assert_eq!(
            response.headers().get("access-control-allow-origin").map(|v| v.to_str().unwrap()),
            Some("*")
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_creates_task() {
        let (server, queue) = memory_app(create_test_config());

        let response = server
            .post("/")
            .json(&callback_body("2023-01-15T14:30", "Q-42", "+15551234567"))
            .await;

        response.assert_status_ok();
        assert_acao(&response);
        assert_eq!(
            response.json::<FulfillmentResponse>(),
            FulfillmentResponse::new(0, "Task created successfully.")
        );

        let submitted = queue.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].queue, "projects/test/locations/us-central1/queues/scheduled-callback");

        let task = &submitted[0].task;
        assert_eq!(task.url, "https://hooks.example.com/events/callback");
        assert_eq!(task.http_method, "POST");
        assert_eq!(task.headers.get("Content-Type").map(String::as_str), Some("application/json"));
        assert_eq!(task.schedule_seconds(), 1673811000);
        assert_eq!(
            task.body,
            base64::engine::general_purpose::STANDARD.encode(r#"{"queueId":"Q-42","callbackNumber":"+15551234567"}"#)
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_legacy_queue_id_field() {
        let (server, queue) = memory_app(create_test_config());

        let response = server
            .post("/")
            .json(&json!({
                "scheduledTime": "2023-01-15T14:30",
                "interaction": {"callProcessingDetails": {"QueueId": "Q-legacy", "ani": "5551234"}}
            }))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = serde_json::from_slice(&queue.submitted()[0].task.decoded_body().unwrap()).unwrap();
        assert_eq!(body, json!({"queueId": "Q-legacy", "callbackNumber": "5551234"}));
    }

    #[test_log::test(tokio::test)]
    async fn test_both_queue_id_spellings_are_accepted() {
        let (server, queue) = memory_app(create_test_config());

        let response = server
            .post("/")
            .json(&json!({
                "scheduledTime": "2023-01-15T14:30",
                "interaction": {"callProcessingDetails": {"queueId": "Q-1", "QueueId": "Q-1", "ani": "555"}}
            }))
            .await;

        response.assert_status_ok();
        let body: serde_json::Value = serde_json::from_slice(&queue.submitted()[0].task.decoded_body().unwrap()).unwrap();
        assert_eq!(body, json!({"queueId": "Q-1", "callbackNumber": "555"}));
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_fields_are_rejected() {
        let (server, queue) = memory_app(create_test_config());

        let bodies = [
            callback_body("", "Q-42", "+15551234567"),
            callback_body("2023-01-15T14:30", "", "+15551234567"),
            callback_body("2023-01-15T14:30", "Q-42", ""),
            json!({"interaction": {"callProcessingDetails": {"queueId": "Q-42", "ani": "1"}}}),
            json!({"scheduledTime": "2023-01-15T14:30", "interaction": {"callProcessingDetails": {"ani": "1"}}}),
            json!({"scheduledTime": "2023-01-15T14:30", "interaction": {"callProcessingDetails": {"queueId": "Q-42"}}}),
            json!({"scheduledTime": "2023-01-15T14:30"}),
            json!({"scheduledTime": "2023-01-15T14:30", "interaction": {}}),
        ];

        for body in bodies {
            let response = server.post("/").json(&body).await;
            assert_eq!(response.status_code(), StatusCode::BAD_REQUEST, "body: {body}");
            assert_acao(&response);
            assert_eq!(response.json::<FulfillmentResponse>(), FulfillmentResponse::new(1, "Invalid parameters"));
        }

        assert_eq!(queue.submission_count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_malformed_body_is_rejected() {
        let (server, queue) = memory_app(create_test_config());

        let response = server.post("/").text("not json at all").await;

        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<FulfillmentResponse>().retval, 1);
        assert_eq!(queue.submission_count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_options_preflight() {
        let (server, queue) = memory_app(create_test_config());

        let response = server
            .method(Method::OPTIONS, "/")
            .json(&callback_body("2023-01-15T14:30", "Q-42", "+15551234567"))
            .await;

        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
        assert_acao(&response);
        assert_eq!(response.headers().get("access-control-allow-methods").unwrap(), "GET, POST");
        assert_eq!(response.headers().get("access-control-allow-headers").unwrap(), "Content-Type, Accept");
        assert_eq!(queue.submission_count(), 0);

        // Preflight never looks at the body
        let response = server.method(Method::OPTIONS, "/").text("{{{").await;
        assert_eq!(response.status_code(), StatusCode::NO_CONTENT);
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_configuration() {
        let configs = [
            Config {
                task_queue: None,
                ..create_test_config()
            },
            Config {
                task_handler_url: None,
                ..create_test_config()
            },
            Config {
                task_queue: Some(String::new()),
                ..create_test_config()
            },
        ];

        for config in configs {
            let (server, queue) = memory_app(config);

            let response = server
                .post("/")
                .json(&callback_body("2023-01-15T14:30", "Q-42", "+15551234567"))
                .await;
            assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_acao(&response);
            assert_eq!(
                response.json::<FulfillmentResponse>(),
                FulfillmentResponse::new(-1, "application intialization failure")
            );

            // Configuration is checked before preflight handling
            let response = server.method(Method::OPTIONS, "/").await;
            assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

            assert_eq!(queue.submission_count(), 0);
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_queue_returns_no_task() {
        let queue = Arc::new(InMemoryTaskQueue::returning_none());
        let server = create_test_app(create_test_config(), queue.clone());

        let response = server
            .post("/")
            .json(&callback_body("2023-01-15T14:30", "Q-42", "+15551234567"))
            .await;

        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_acao(&response);
        assert_eq!(response.json::<FulfillmentResponse>(), FulfillmentResponse::new(2, "Failed to create task."));
        assert_eq!(queue.submission_count(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_queue_failure_is_unhandled_error() {
        let queue = Arc::new(InMemoryTaskQueue::failing("queue is paused"));
        let server = create_test_app(create_test_config(), queue.clone());

        let response = server
            .post("/")
            .json(&callback_body("2023-01-15T14:30", "Q-42", "+15551234567"))
            .await;

        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.json::<FulfillmentResponse>();
        assert_eq!(body.retval, -1);
        assert!(body.retmsg.starts_with("Unhandled error: "), "{}", body.retmsg);
        assert!(body.retmsg.contains("queue is paused"), "{}", body.retmsg);
        assert_eq!(queue.submission_count(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_unparseable_time_is_unhandled_error() {
        let (server, queue) = memory_app(create_test_config());

        let response = server.post("/").json(&callback_body("next tuesday", "Q-42", "+15551234567")).await;

        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.json::<FulfillmentResponse>();
        assert_eq!(body.retval, -1);
        assert!(body.retmsg.contains("next tuesday"), "{}", body.retmsg);
        assert_eq!(queue.submission_count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_past_time_is_accepted() {
        let (server, queue) = memory_app(create_test_config());

        let response = server
            .post("/")
            .json(&callback_body("2001-01-01T00:00", "Q-42", "+15551234567"))
            .await;

        response.assert_status_ok();
        assert_eq!(queue.submitted()[0].task.schedule_seconds(), 978325200);
    }

    #[test_log::test(tokio::test)]
    async fn test_identical_requests_enqueue_twice() {
        let (server, queue) = memory_app(create_test_config());
        let body = callback_body("2023-01-15T14:30", "Q-42", "+15551234567");

        server.post("/").json(&body).await.assert_status_ok();
        server.post("/").json(&body).await.assert_status_ok();

        let submitted = queue.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0].task, submitted[1].task);
    }

    #[test_log::test(tokio::test)]
    async fn test_configured_offset_is_used() {
        let config = Config {
            schedule_utc_offset: "+00:00".parse().unwrap(),
            ..create_test_config()
        };
        let (server, queue) = memory_app(config);

        server
            .post("/")
            .json(&callback_body("2023-01-15T14:30", "Q-42", "+15551234567"))
            .await
            .assert_status_ok();

        assert_eq!(queue.submitted()[0].task.schedule_seconds(), 1673793000);
    }

    struct PanickingQueue;

    #[async_trait]
    impl TaskQueue for PanickingQueue {
        async fn create_task(&self, _queue: &str, _task: HttpTask) -> Result<Option<TaskHandle>, TaskQueueError> {
            panic!("client exploded")
        }

        fn backend_name(&self) -> &'static str {
            "panicking"
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_panic_becomes_unhandled_error() {
        let server = create_test_app(create_test_config(), Arc::new(PanickingQueue));

        let response = server
            .post("/")
            .json(&callback_body("2023-01-15T14:30", "Q-42", "+15551234567"))
            .await;

        assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_acao(&response);
        assert_eq!(
            response.json::<FulfillmentResponse>(),
            FulfillmentResponse::new(-1, "Unhandled error: client exploded")
        );
    }
}
