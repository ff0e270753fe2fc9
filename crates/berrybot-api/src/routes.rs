//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use berrybot_core::error::{BerrybotError, Result};

use crate::gateway;
use crate::handlers;
use crate::state::AppState;

/// Uploads arrive base64-encoded inside JSON.
const UPLOAD_BODY_LIMIT: usize = 32 * 1024 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let port = state.config.server.port;
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT]);

    // The gateway checks its own `token` query parameter.
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(gateway::chat_gateway));

    let protected_routes = Router::new()
        .route(
            "/files",
            get(handlers::list_files)
                .post(handlers::upload_file)
                .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route(
            "/files/{key}",
            get(handlers::download_file).delete(handlers::delete_file),
        )
        .route("/sync", post(handlers::sync))
        .route("/analytics", get(handlers::analytics))
        .route("/email/inbound", post(handlers::email_inbound))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ));

    public_routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind 127.0.0.1 on the configured port and serve until shutdown.
pub async fn start_server(state: AppState) -> Result<()> {
    let addr = format!("127.0.0.1:{}", state.config.server.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BerrybotError::Api(format!("Failed to bind: {}", e)))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| BerrybotError::Api(format!("Server error: {}", e)))?;

    Ok(())
}
