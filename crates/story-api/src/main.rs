//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use story_api::{create_router, metrics, ApiConfig, AppState};
use story_gen::{GenClientConfig, GenerationBackend, HttpGenerationClient};
use story_worker::{BackendFactory, JobExecutor, WorkerConfig};

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "story=info".parse() {
        env_filter = env_filter.add_directive(directive);
    }

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
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Start the executor pool on the API's own store and queue.
fn spawn_embedded_workers(state: &AppState) -> Option<(Arc<JobExecutor>, JoinHandle<()>)> {
    let gen_config = GenClientConfig::from_env();
    let factory: BackendFactory = Arc::new(move || {
        let client = HttpGenerationClient::new(gen_config.clone())?;
        Ok(Arc::new(client) as Arc<dyn GenerationBackend>)
    });

    match JobExecutor::new(
        WorkerConfig::from_env(),
        Arc::clone(&state.queue),
        Arc::clone(&state.store),
        factory,
    ) {
        Ok(executor) => {
            let executor = Arc::new(executor);
            let runner = Arc::clone(&executor);
            let handle = tokio::spawn(async move {
                if let Err(e) = runner.run().await {
                    error!("Embedded executor error: {}", e);
                }
            });
            info!("Embedded workers started");
            Some((executor, handle))
        }
        Err(e) => {
            error!("Failed to start embedded workers: {}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting story-api");

    let config = ApiConfig::from_env();
    info!(
        "API config: host={}, port={}, store={:?}, embedded_workers={}",
        config.host, config.port, config.store_backend, config.embedded_workers
    );

    let state = match AppState::new(config.clone()).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create application state: {}", e);
            std::process::exit(1);
        }
    };

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install Prometheus recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let executor = if config.embedded_workers {
        spawn_embedded_workers(&state)
    } else {
        None
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some((executor, handle)) = executor {
        executor.shutdown();
        handle.await.ok();
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal");
}
