//! Gemini Proxy - main entry point
//!
//! Creates and runs the HTTP server with all routes and middleware, plus the
//! background tasks for blacklist reinstatement and the liveness self-ping.

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use gemini_proxy_rust::{
    api::{chat_completions, health, index, list_models, metrics_handler, AppState},
    core::{init_logging, init_metrics, AppConfig, KeyPool, MetricsMiddleware, RateLimiter},
    services::{GeminiClient, RetryOrchestrator, RetryPolicy},
};

/// How often timed blacklists are swept.
const REINSTATE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Self-ping cadence, to keep hosted deployments from idling out.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

fn main() -> Result<()> {
    // Load .env before reading any environment variables
    dotenvy::dotenv().ok();

    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    init_logging();
    init_metrics();

    let config = AppConfig::load()?;
    tracing::info!("MaxRetries: {}", config.max_retries);
    tracing::info!("MaxRequests: {}", config.max_requests);
    tracing::info!("LimitWindow: {} seconds", config.limit_window_secs);

    let pool = Arc::new(KeyPool::new(config.api_keys.clone()));
    pool.log_keys();

    let limiter = Arc::new(RateLimiter::new(
        config.max_requests,
        Duration::from_secs(config.limit_window_secs),
    ));

    let http_client = create_http_client(&config);
    let upstream = Arc::new(GeminiClient::new(http_client.clone(), &config.upstream));

    let orchestrator = RetryOrchestrator::new(
        pool.clone(),
        limiter,
        upstream,
        RetryPolicy::from_config(&config),
    );

    let port = config.server.port;
    let host = config.server.host.clone();
    let state = Arc::new(AppState {
        config,
        orchestrator,
    });

    spawn_reinstate_sweeper(pool);
    spawn_keep_alive(http_client, port);

    let app = build_router(state);

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!("Starting Gemini proxy on {addr}");
    tracing::info!("OpenAI API: /chat/completions, /models (also under /v1)");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router with all endpoints.
fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat/completions", post(chat_completions))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/models", get(list_models))
        .route("/v1/models", get(list_models))
        .route("/", get(index))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the HTTP client shared by the upstream adapter and the self-ping.
fn create_http_client(config: &AppConfig) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.request_timeout_secs))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .expect("Failed to build HTTP client")
}

/// Periodically reinstate keys whose blacklist expired. The task only calls
/// the pool's synchronized entrypoints.
fn spawn_reinstate_sweeper(pool: Arc<KeyPool>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REINSTATE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            pool.reinstate_expired();
        }
    });
}

/// Ping our own health endpoint on a long interval so free-tier hosts do not
/// spin the process down.
fn spawn_keep_alive(client: reqwest::Client, port: u16) {
    tokio::spawn(async move {
        let url = format!("http://127.0.0.1:{port}/health");
        let mut interval = tokio::time::interval(KEEP_ALIVE_INTERVAL);
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            match client.get(&url).timeout(Duration::from_secs(10)).send().await {
                Ok(response) => {
                    tracing::info!("Keep alive ping: {}", response.status());
                }
                Err(err) => {
                    tracing::warn!("Keep alive ping failed: {err}");
                }
            }
        }
    });
}
