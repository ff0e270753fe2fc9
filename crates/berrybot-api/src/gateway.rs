//! WebSocket chat gateway.
//!
//! Each text frame is a `sendMessage` request. The gateway relays the query
//! to the agent, notifies the admin when the frame carries the grower's
//! email, logs the exchange for analytics, and answers on the same socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use berrybot_core::protocol::{ChatRequestFrame, ChatResponseFrame, SEND_MESSAGE_ACTION};
use berrybot_core::types::UNKNOWN_CATEGORY;

use crate::agent::{invoke_with_retries, AgentRequest};
use crate::auth::token_matches;
use crate::error::ApiError;
use crate::notify::AdminNotification;
use crate::session_log::SessionRecord;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayParams {
    pub token: Option<String>,
}

/// GET /ws?token=...
pub async fn chat_gateway(
    State(state): State<AppState>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Response {
    if !token_matches(&state, params.token.as_deref()) {
        tracing::warn!("Rejected gateway connection with invalid token");
        return ApiError::Unauthorized("Invalid or missing token".to_string()).into_response();
    }
    ws.on_upgrade(move |socket| serve_connection(state, socket))
}

async fn serve_connection(state: AppState, mut socket: WebSocket) {
    let connection_id = Uuid::new_v4();
    tracing::debug!(connection_id = %connection_id, "Gateway connection opened");

    while let Some(message) = socket.recv().await {
        let raw = match message {
            Ok(Message::Text(text)) => text.as_str().to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Gateway connection error");
                break;
            }
        };

        let reply = handle_frame(&state, &raw).await;
        let payload = match serde_json::to_string(&reply) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode response frame");
                break;
            }
        };
        if let Err(e) = socket.send(Message::Text(payload.into())).await {
            tracing::warn!(connection_id = %connection_id, error = %e, "WebSocket send failed");
            break;
        }
    }

    tracing::debug!(connection_id = %connection_id, "Gateway connection closed");
}

/// Answer one raw request frame.
pub async fn handle_frame(state: &AppState, raw: &str) -> ChatResponseFrame {
    let frame: ChatRequestFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid request frame");
            return ChatResponseFrame::failure(format!("Invalid request frame: {}", e), None);
        }
    };
    if frame.action != SEND_MESSAGE_ACTION {
        return ChatResponseFrame::failure(
            format!("Unknown action \"{}\"", frame.action),
            frame.request_id,
        );
    }

    let query = frame.querytext.trim();
    tracing::info!(
        session_id = %frame.session_id,
        location = %frame.location,
        request_id = ?frame.request_id,
        "Received query"
    );

    let request = AgentRequest {
        session_id: frame.session_id.clone(),
        querytext: query.to_string(),
        location: frame.location.clone(),
        email: frame.email.clone(),
    };
    let reply = match invoke_with_retries(
        state.agent.as_ref(),
        &request,
        state.config.server.agent_max_attempts,
    )
    .await
    {
        Ok(reply) => reply,
        Err(e) => return ChatResponseFrame::failure(e.to_string(), frame.request_id),
    };

    let mut response = ChatResponseFrame::answer(reply.text.clone(), frame.request_id);
    response.requires_email = reply.requires_email;

    match frame.email.as_deref() {
        Some(email) => {
            // Follow-up of an escalated query: notify instead of logging it twice.
            let notification = AdminNotification::assistance_request(
                &state.config.server,
                email,
                query,
                &reply.text,
                Utc::now(),
            );
            let status = match state.notifier.notify(&notification).await {
                Ok(()) => "success",
                Err(e) => {
                    tracing::error!(error = %e, "Admin notification failed");
                    "error"
                }
            };
            response.email_status = Some(status.to_string());
        }
        None => {
            let category = reply
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());
            let record = SessionRecord {
                session_id: frame.session_id.clone(),
                location: frame.location.clone(),
                category,
                timestamp: Utc::now(),
            };
            if let Err(e) = state.session_log.append(record) {
                tracing::warn!(error = %e, "Failed to log session record");
            }
        }
    }

    response
}
