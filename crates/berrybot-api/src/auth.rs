//! API authentication via bearer tokens.
//!
//! REST calls present `Authorization: Bearer <token>`. WebSocket clients
//! cannot set headers from every runtime, so the chat gateway takes the
//! same token as a `token` query parameter instead.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::Rng;

use crate::error::ApiError;
use crate::state::AppState;

/// Generate a random 32-character hex token.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    hex::encode(bytes)
}

/// Load token from file, or generate and save a new one.
pub fn load_or_generate_token(token_path: &std::path::Path) -> String {
    if let Ok(contents) = std::fs::read_to_string(token_path) {
        let token = contents.trim().to_string();
        if !token.is_empty() {
            tracing::info!("API token loaded from {}", token_path.display());
            return token;
        }
    }

    let token = generate_token();

    if let Some(parent) = token_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(token_path, &token) {
        tracing::warn!(error = %e, "Failed to save API token to {}", token_path.display());
    } else {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(token_path, std::fs::Permissions::from_mode(0o600));
        }
        tracing::info!("API token saved to {}", token_path.display());
    }

    token
}

/// True if `presented` is the server's API token.
pub fn token_matches(state: &AppState, presented: Option<&str>) -> bool {
    presented.is_some_and(|t| !t.is_empty() && t == state.api_token)
}

/// Middleware that validates Bearer token authentication.
pub async fn require_auth(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(value) = req.headers().get("authorization") else {
        return ApiError::Unauthorized("Missing Authorization header".to_string()).into_response();
    };
    let Ok(value) = value.to_str() else {
        return ApiError::Unauthorized("Invalid Authorization header encoding".to_string())
            .into_response();
    };

    if token_matches(&state, value.strip_prefix("Bearer ")) {
        return next.run(req).await;
    }
    tracing::warn!(path = %req.uri().path(), "Rejected request with invalid bearer token");
    ApiError::Unauthorized("Invalid bearer token".to_string()).into_response()
}
