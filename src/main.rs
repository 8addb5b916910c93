mod handlers;
mod models;
mod services;

use std::path::Path;
use std::sync::Arc;
use axum::{
    Router,
    middleware,
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    response::Response,
    body::Body,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use models::config::AppConfig;
use services::engine::EngineHandle;
use services::onnx_engine::{ColorizerKind, OnnxColorizer};
use services::orchestrator::RequestOrchestrator;
use services::session_registry::SessionRegistry;

const CLEANUP_INTERVAL_SECS: u64 = 60;

pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: RequestOrchestrator,
}

impl AppState {
    pub async fn new(
        config: Arc<AppConfig>,
        colorizer: EngineHandle,
        suggester: EngineHandle,
    ) -> anyhow::Result<Self> {
        let registry = Arc::new(SessionRegistry::new(&config).await?);
        let orchestrator = RequestOrchestrator::new(
            config.session_mode,
            registry,
            config.hint_radius,
            colorizer,
            suggester,
        );
        Ok(Self { config, orchestrator })
    }
}

async fn request_id_middleware(
    request: Request<Body>,
    next: axum::middleware::Next,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static("x-request-id"), value);
    }
    response
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
        .expose_headers([HeaderName::from_static("x-request-id")]);

    if config.allowed_origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

pub fn app_router(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
            )
        })
        .on_response(|response: &Response, latency: std::time::Duration, _span: &Span| {
            tracing::info!(
                status = response.status().as_u16(),
                latency_ms = latency.as_millis() as u64,
                "response",
            );
        });

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/colorize", post(handlers::colorize::colorize))
        .route("/colorize_with_hints", post(handlers::colorize::colorize_with_hints))
        .route("/suggest_colors", post(handlers::suggest::suggest_colors))
        .route("/get_session_image", get(handlers::session_files::get_session_image))
        .route("/get_result_file", get(handlers::session_files::get_result_file))
        .layer(axum::extract::DefaultBodyLimit::max(state.config.max_upload_bytes as usize))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(cors_layer(&state.config))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    handlers::health::init_start_time();

    let config = Arc::new(config);
    let colorizer = EngineHandle::new(
        "colorizer",
        Box::new(OnnxColorizer::new(
            ColorizerKind::Direct,
            Path::new(&config.color_model_path),
            None,
            config.grid_size,
        )),
        config.engine_timeout_secs,
    );
    let suggester = EngineHandle::new(
        "suggester",
        Box::new(OnnxColorizer::new(
            ColorizerKind::Distribution,
            Path::new(&config.dist_model_path),
            Some(Path::new(&config.ab_gamut_path)),
            config.grid_size,
        )),
        config.engine_timeout_secs,
    );

    let state = Arc::new(AppState::new(config.clone(), colorizer, suggester).await?);
    tracing::info!(
        mode = ?config.session_mode,
        grid_size = config.grid_size,
        hint_radius = config.hint_radius,
        "Colorization service configured"
    );

    let app = app_router(state.clone());

    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            cleanup_state.orchestrator.registry().cleanup_expired();
        }
    });

    let addr = config.listen_addr.clone();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
