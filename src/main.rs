//! OCR Server
//!
//! A self-hosted HTTP API that accepts images (file upload, base64 payload,
//! or remote URL) and returns recognized text with confidence scores, backed
//! by a pool of per-language Tesseract engines.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocr_server::config::Config;
use ocr_server::ocr::EngineFactory;
use ocr_server::state::AppState;
use ocr_server::{ocr, routes};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Pick the engine factory the server runs with. Tesseract when compiled
/// in; otherwise a factory whose acquires fail cleanly at request time.
fn engine_factory(config: &Config) -> Arc<dyn EngineFactory> {
    #[cfg(feature = "ocr-tesseract")]
    {
        Arc::new(ocr::TesseractEngineFactory::new(
            config.ocr.tessdata_path.clone(),
        ))
    }
    #[cfg(not(feature = "ocr-tesseract"))]
    {
        let _ = config;
        tracing::warn!(
            "built without the `ocr-tesseract` feature; recognition requests will fail"
        );
        Arc::new(ocr::UnavailableEngineFactory)
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocr_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Starting OCR Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Default language: {}", config.ocr.default_language);

    let factory = engine_factory(&config);
    let app_state = AppState::new(config.clone(), factory);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/ocr", routes::ocr::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state.clone());

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], config.server.port)));
    tracing::info!("OCR Server listening on {}", addr);
    tracing::info!("OCR API: http://{}/ocr", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind server address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // In-flight requests have drained; dispose the pooled engines.
    app_state.shutdown().await;

    tracing::info!("Server shutdown complete");
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
