//! # cbsched: Scheduled Callback Fulfillment
//!
//! `cbsched` is a webhook service that turns contact-center callback requests into deferred HTTP
//! tasks. A caller asks to be called back at a given time; the contact-center flow posts that
//! request here; `cbsched` validates it and enqueues a task on a managed queue (Google Cloud
//! Tasks) that will invoke a downstream handler with `{queueId, callbackNumber}` at the requested
//! time.
//!
//! ## Request Flow
//!
//! Every request to `/` goes through the same short pipeline, each step able to end it early:
//!
//! 1. Check that the queue and handler URL are configured (re-checked per request).
//! 2. Answer `OPTIONS` preflight requests directly.
//! 3. Validate `scheduledTime`, `interaction.callProcessingDetails.queueId` and `ani`.
//! 4. Build the task ([`callback`]) and submit it once through a [`tasks::TaskQueue`].
//!
//! Every outcome is a `{retval, retmsg}` body; see [`errors`] for the failure codes. Durability,
//! retries and delivery of the scheduled call belong to the queue, not to this service.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use cbsched::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = cbsched::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     cbsched::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     Application::new(config)?
//!         .serve(async {
//!             tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!         })
//!         .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod callback;
pub mod config;
pub mod errors;
mod openapi;
pub mod tasks;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use crate::{openapi::ApiDoc, tasks::TaskQueue};
use axum::{
    Json, Router,
    http::{HeaderValue, header::ACCESS_CONTROL_ALLOW_ORIGIN},
    routing::{any, get},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    set_header::SetResponseHeaderLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, warn};
use utoipa::OpenApi;

pub use config::Config;

/// Application state shared across all request handlers.
///
/// - `config`: Application configuration loaded from file/environment
/// - `task_queue`: Backend that receives callback tasks
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .task_queue(Arc::new(InMemoryTaskQueue::new()))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub task_queue: Arc<dyn TaskQueue>,
}

/// Build the application router.
///
/// Panics in handlers become the unhandled-error response, and every response (errors and
/// panics included) carries `Access-Control-Allow-Origin: *`.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let mut router = Router::new()
        .route("/", any(api::handlers::fulfillment::handle_fulfillment))
        .route("/healthz", get(api::handlers::health::healthz))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    // Add Prometheus metrics if enabled
    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router
        .with_state(state)
        .layer(CatchPanicLayer::custom(errors::panic_response))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    Ok(router)
}

/// The runnable service: configuration, task queue and router.
///
/// 1. **Create**: [`Application::new`] builds the task queue backend and the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves, then flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create an application using the task queue backend named in `config`
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let task_queue = tasks::create_task_queue(&config.queue_backend)?;
        Self::with_task_queue(config, task_queue)
    }

    /// Create an application around an existing task queue
    pub fn with_task_queue(config: Config, task_queue: Arc<dyn TaskQueue>) -> anyhow::Result<Self> {
        debug!("Starting cbsched with configuration: {:#?}", config);

        // Not fatal: requests are answered with a configuration error until this is fixed
        if let Err(e) = config.task_queue().and(config.task_handler_url()) {
            warn!("{e}; every fulfillment request will fail");
        }

        info!(backend = task_queue.backend_name(), "Task queue ready");

        let state = AppState::builder().config(config.clone()).task_queue(task_queue).build();
        let router = build_router(state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("cbsched listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        telemetry::shutdown_telemetry();

        Ok(())
    }
}
