//! # Entitlement HTTP Server
//!
//! HTTP front door for the ExamPass entitlement engine.
//!
//! ## Endpoints
//!
//! - `POST /v1/access/check` - Resource access check
//! - `POST /v1/authoring/check` - Authoring scope check
//! - `POST /v1/features/check` - Feature flag check
//! - `POST /v1/quota/consume` - Atomic quota check-and-consume
//! - `POST /v1/subscriptions/activate` - Checkout activation
//! - `GET /v1/principals/:id/entitlements` - Entitlement summary
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics (metrics port)
//!
//! ## Configuration
//!
//! - `ENTITLEMENTS_CONFIG` - Path to a TOML config file (optional)
//! - `PORT` - HTTP server port (default: 8080)
//! - `METRICS_PORT` - Metrics server port (default: 9090)
//! - `DATABASE_URL` - PostgreSQL connection string (postgres backend)
//! - `RUST_LOG` - Log level (default: info)

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
    serve,
};
use exampass_entitlements::{
    catalog::InMemoryResourceCatalog,
    config::{EntitlementConfig, SeedData, StoreBackend},
    service::{
        AccessResponse, ActivationRequest, ActivationResponse, AuthoringResponse, EntitlementSummary,
        QuotaResponse,
    },
    EntitlementError, EntitlementService, InMemorySubscriptionStore, QuotaAction, ResourceScope,
    SubscriptionStore,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: Arc<EntitlementService>,
    start_time: std::time::Instant,
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

/// Application error type
#[derive(Debug)]
struct AppError(EntitlementError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match &self.0 {
            EntitlementError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EntitlementError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            EntitlementError::QuotaExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded"),
            EntitlementError::ConcurrentUpdateConflict(_) => (StatusCode::CONFLICT, "conflict"),
            EntitlementError::SubscriptionInactive(_) => (StatusCode::CONFLICT, "subscription_inactive"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<EntitlementError> for AppError {
    fn from(err: EntitlementError) -> Self {
        AppError(err)
    }
}

#[derive(Debug, Deserialize)]
struct AccessCheckRequest {
    principal_id: String,
    resource_id: String,
}

#[derive(Debug, Deserialize)]
struct AuthoringCheckRequest {
    principal_id: String,
    #[serde(default)]
    scope: ResourceScope,
}

#[derive(Debug, Deserialize)]
struct FeatureCheckRequest {
    principal_id: String,
    feature: String,
}

#[derive(Debug, Serialize)]
struct FeatureCheckResponse {
    allowed: bool,
}

#[derive(Debug, Deserialize)]
struct QuotaConsumeRequest {
    principal_id: String,
    action: QuotaAction,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    version: String,
}

/// Metrics response (Prometheus format)
struct MetricsResponse {
    metrics: String,
}

impl IntoResponse for MetricsResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            self.metrics,
        )
            .into_response()
    }
}

/// POST /v1/access/check
async fn check_access(
    State(state): State<AppState>,
    Json(req): Json<AccessCheckRequest>,
) -> Result<Json<AccessResponse>, AppError> {
    let response = state.service.check_access(&req.principal_id, &req.resource_id).await?;
    info!(
        "Access check: principal={}, resource={}, allowed={}",
        req.principal_id, req.resource_id, response.allowed
    );
    Ok(Json(response))
}

/// POST /v1/authoring/check
async fn check_authoring(
    State(state): State<AppState>,
    Json(req): Json<AuthoringCheckRequest>,
) -> Result<Json<AuthoringResponse>, AppError> {
    let response = state.service.check_authoring(&req.principal_id, &req.scope).await?;
    info!(
        "Authoring check: principal={}, allowed={}",
        req.principal_id, response.allowed
    );
    Ok(Json(response))
}

/// POST /v1/features/check
async fn check_feature(
    State(state): State<AppState>,
    Json(req): Json<FeatureCheckRequest>,
) -> Result<Json<FeatureCheckResponse>, AppError> {
    let allowed = state.service.check_feature(&req.principal_id, &req.feature).await?;
    Ok(Json(FeatureCheckResponse { allowed }))
}

/// POST /v1/quota/consume
async fn consume_quota(
    State(state): State<AppState>,
    Json(req): Json<QuotaConsumeRequest>,
) -> Result<Json<QuotaResponse>, AppError> {
    let response = state
        .service
        .check_and_consume_quota(&req.principal_id, req.action)
        .await?;
    info!(
        "Quota request: principal={}, action={}, allowed={}, remaining={}",
        req.principal_id, req.action, response.allowed, response.remaining
    );
    Ok(Json(response))
}

/// POST /v1/subscriptions/activate
async fn activate_subscription(
    State(state): State<AppState>,
    Json(req): Json<ActivationRequest>,
) -> Result<(StatusCode, Json<ActivationResponse>), AppError> {
    let response = state.service.activate_subscription(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /v1/principals/:id/entitlements
async fn entitlement_summary(
    State(state): State<AppState>,
    Path(principal_id): Path<String>,
) -> Result<Json<EntitlementSummary>, AppError> {
    Ok(Json(state.service.entitlement_summary(&principal_id).await?))
}

/// GET /health - Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        version: exampass_entitlements::VERSION.to_string(),
    })
}

/// GET /metrics - Prometheus metrics endpoint
async fn metrics(State(state): State<AppState>) -> MetricsResponse {
    let uptime = state.start_time.elapsed().as_secs();

    let mut metrics = format!(
        "# HELP entitlements_uptime_seconds Server uptime in seconds\n\
         # TYPE entitlements_uptime_seconds gauge\n\
         entitlements_uptime_seconds {}\n\n",
        uptime
    );
    if let Some(collector) = state.service.metrics() {
        metrics.push_str(&collector.export_prometheus());
    }

    MetricsResponse { metrics }
}

/// Create the HTTP router with all endpoints
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace = TraceLayer::new_for_http()
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/v1/access/check", post(check_access))
        .route("/v1/authoring/check", post(check_authoring))
        .route("/v1/features/check", post(check_feature))
        .route("/v1/quota/consume", post(consume_quota))
        .route("/v1/subscriptions/activate", post(activate_subscription))
        .route("/v1/principals/:id/entitlements", get(entitlement_summary))
        .route("/health", get(health_check))
        .layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

/// Create the metrics router
fn create_metrics_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}

/// Build the record store selected by the configuration
async fn build_store(
    config: &EntitlementConfig,
    catalog: &InMemoryResourceCatalog,
) -> anyhow::Result<Arc<dyn SubscriptionStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            let store = InMemorySubscriptionStore::new();
            if let Some(path) = &config.store.seed_file {
                SeedData::load(path)
                    .with_context(|| format!("Failed to load seed file {}", path.display()))?
                    .apply(&store, catalog)
                    .await?;
                info!("Loaded seed data from {}", path.display());
            }
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            let url = config
                .store
                .database_url
                .as_deref()
                .context("store.database_url is required for the postgres backend")?;
            let store = exampass_entitlements::store::PostgresSubscriptionStore::new(url).await?;
            store.run_migrations().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => {
            anyhow::bail!("postgres backend requested but the `postgres` feature is not enabled")
        }
    }
}

/// Main server entrypoint
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ExamPass Entitlement Server v{}", exampass_entitlements::VERSION);

    let config = match std::env::var("ENTITLEMENTS_CONFIG") {
        Ok(path) => EntitlementConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        Err(_) => EntitlementConfig::default(),
    }
    .apply_env();
    config.validate()?;

    info!("Configuration:");
    info!("  Port: {}", config.server.port);
    info!("  Metrics Port: {}", config.server.metrics_port);
    info!("  Store: {:?}", config.store.backend);
    info!("  Plans: {}", config.plans.len());

    let catalog = Arc::new(InMemoryResourceCatalog::new());
    let store = build_store(&config, &catalog).await?;
    let plans = config.plan_catalog()?;

    let service = EntitlementService::new(config.engine.clone(), store, catalog, plans);

    let state = AppState {
        service: Arc::new(service),
        start_time: std::time::Instant::now(),
    };

    let app = create_router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    let metrics_app = create_metrics_router(state);
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.server.metrics_port));

    info!("Starting HTTP server on {}", addr);
    info!("Starting metrics server on {}", metrics_addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server on {}", addr))?;
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .with_context(|| format!("Failed to bind metrics server on {}", metrics_addr))?;

    let server = serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    let metrics_server = serve(metrics_listener, metrics_app.into_make_service())
        .with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(
        async {
            server.await.map_err(|e| {
                error!("HTTP server error: {}", e);
                e
            })
        },
        async {
            metrics_server.await.map_err(|e| {
                error!("Metrics server error: {}", e);
                e
            })
        }
    )?;

    info!("Servers shut down gracefully");
    Ok(())
}
