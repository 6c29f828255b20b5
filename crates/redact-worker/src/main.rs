//! Video redaction worker binary.

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use redact_worker::{BatchRunner, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON when requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("redact=info,ort=warn,onnxruntime=warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting redact-worker");

    let config = match WorkerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Worker config: {:?}", config);

    // Ctrl-C flips the cancellation flag; the batch checks it once per
    // frame and once per video
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal, cancelling batch");
        let _ = cancel_tx.send(true);
    });

    let runner = BatchRunner::new(config);
    match runner.run(cancel_rx).await {
        Ok(summary) => {
            info!(
                processed = summary.processed,
                skipped = summary.skipped,
                rescan_fixed_frames = summary.rescan_fixed_frames,
                cancelled = summary.cancelled,
                "Worker done"
            );
            if summary.cancelled {
                std::process::exit(130);
            }
        }
        Err(e) => {
            error!("Batch failed: {}", e);
            std::process::exit(1);
        }
    }
}
