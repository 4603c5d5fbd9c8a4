use cbsched::{Application, Config, telemetry};
use clap::Parser;

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!(signal = "SIGINT", "Shutting down");
        },
        _ = terminate => {
            tracing::info!(signal = "SIGTERM", "Shutting down");
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cbsched::config::Args::parse();
    let config = Config::load(&args)?;

    if args.validate {
        println!("Configuration in {} is valid (queue backend: {}).", args.config, config.queue_backend.name());
        // Missing task settings only fail requests, so report them without failing validation
        if let Err(e) = config.task_queue().and(config.task_handler_url()) {
            println!("Warning: {e}; fulfillment requests will fail until it is set.");
        }
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config,
        backend = config.queue_backend.name(),
        offset = %config.schedule_utc_offset,
        "Starting cbsched"
    );

    Application::new(config)?.serve(shutdown_signal()).await
}
