//! RefGraph API Gateway
//!
//! HTTP surface of the citation graph:
//! - Seed document upload and graph reads
//! - Expansion run trigger, status and cancellation
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;
mod runs;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use refgraph_common::{
    config::AppConfig,
    connect_store,
    metrics::{self, LATENCY_BUCKETS},
    GraphStore,
};
use refgraph_expansion::ExpansionController;
use runs::RunRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn GraphStore>,
    pub controller: Arc<ExpansionController>,
    /// Runs started by this process, recently finished ones included
    pub runs: Arc<RunRegistry>,
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);
    init_tracing(&config);

    info!("Starting RefGraph API Gateway v{}", refgraph_common::VERSION);

    // Initialize metrics
    let metrics_handle = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )?
            .install_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    // Graph store and expansion engine
    let store = connect_store(&config).await?;
    info!(backend = store.backend(), "Graph store ready");
    let controller = ExpansionController::from_config(&config, store.clone())?;

    let state = AppState {
        config: config.clone(),
        store,
        controller: Arc::new(controller),
        runs: Arc::new(RunRegistry::new(&config.expansion)),
        metrics: metrics_handle,
    };

    let app = create_router(state.clone());

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    drain_runs(
        &state.runs,
        Duration::from_secs(config.server.shutdown_grace_secs),
    )
    .await;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel runs still expanding and wait for their workers to finish the
/// candidate in hand. Returns false when the grace period ran out.
async fn drain_runs(runs: &RunRegistry, grace: Duration) -> bool {
    let pending = runs.unfinished();
    if pending.is_empty() {
        return true;
    }
    for handle in &pending {
        if handle.cancel() {
            warn!(run_id = %handle.run_id(), "Cancelling unfinished expansion run");
        }
    }

    let drained = tokio::time::timeout(grace, async {
        for handle in &pending {
            if let Err(e) = handle.join().await {
                warn!(run_id = %handle.run_id(), error = %e, "Expansion run ended with an error");
            }
        }
    })
    .await;

    match drained {
        Ok(()) => {
            info!(runs = pending.len(), "Expansion runs drained");
            true
        }
        Err(_) => {
            warn!(
                remaining = runs.unfinished().len(),
                "Expansion runs did not drain before the shutdown deadline"
            );
            false
        }
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // JSON escaping can inflate the body past the raw content size
    let body_limit = DefaultBodyLimit::max(state.config.server.max_upload_bytes.saturating_mul(2));

    let api_routes = Router::new()
        // Documents
        .route("/documents", post(handlers::documents::create_document))
        .route("/documents/{id}", get(handlers::documents::get_document))
        .route(
            "/documents/{id}/citations",
            get(handlers::documents::get_citations),
        )
        .route(
            "/documents/{id}/cited-by",
            get(handlers::documents::get_cited_by),
        )
        .route("/documents/{id}/graph", get(handlers::documents::get_graph))
        // Expansion runs
        .route("/expansions", post(handlers::expansions::start_expansion))
        .route(
            "/expansions/{id}",
            get(handlers::expansions::get_expansion).delete(handlers::expansions::cancel_expansion),
        )
        .route_layer(axum::middleware::from_fn(middleware::track_requests));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::health::metrics))
        .nest("/v1", api_routes)
        .layer(body_limit)
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.server.request_timeout_secs,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
