use crate::config::Config;
use crate::error::ThrottlerResult;
use crate::handlers::{health_check, inventory_usage, upload_file, user_usage, AppState, SharedState};
use crate::middleware::logging_middleware;
use crate::request_admission::request_throttle_middleware;
use crate::upload_admission::upload_throttle_middleware;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{middleware, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Routes served by this binary behind the admission layers
pub fn default_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/usage", get(user_usage))
        .route("/api/inventory/v1/usage", get(inventory_usage))
        .route("/api/v1/files", post(upload_file))
}

/// Wrap `routes` with request and upload admission.
///
/// The request throttle runs first, so an upload refused on request count
/// never reaches the upload quota.
pub fn create_app(state: SharedState, routes: Router<SharedState>) -> Router {
    let max_upload_bytes = state.upload_admission.max_body_bytes();
    routes
        .layer(middleware::from_fn_with_state(state.clone(), upload_throttle_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), request_throttle_middleware))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn(logging_middleware)),
        )
        .with_state(state)
}

pub struct Server {
    app: Router,
    bind_addr: SocketAddr,
}

impl Server {
    pub fn new(config: &Config) -> ThrottlerResult<Self> {
        let settings = config.throttle_settings()?;
        settings.check()?;

        let state: SharedState = Arc::new(AppState::new(
            &settings,
            config.path_classifier(),
            config.max_upload_bytes,
        ));
        let app = create_app(state, default_routes());

        Ok(Self {
            app,
            bind_addr: config.bind_addr,
        })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;

        tracing::info!("Throttler listening on {}", self.bind_addr);
        tracing::info!("Health check available at /health");

        axum::serve(
            listener,
            self.app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}
