//! JSON transport over the dialogue engine.
//!
//! - `POST /chat` - one user turn, `{session_id?, message}` -> `{session_id, reply}`
//! - `POST /sessions/{id}/reset` - forget a session's conversation

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use examdesk_agent::AgentRuntime;
use examdesk_core::{ApplicationError, DomainError, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub session_id: String,
    pub reset: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: &'static str,
    pub correlation_id: String,
}

type ChatRejection = (StatusCode, Json<ChatError>);

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/sessions/{session_id}/reset", post(reset_session))
        .with_state(ChatState { runtime })
}

async fn chat(
    State(state): State<ChatState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatRejection> {
    let message = request.message.trim();
    if message.is_empty() {
        let correlation_id = request.session_id.as_deref().unwrap_or("unassigned");
        return Err(invalid(correlation_id, "message must not be empty"));
    }

    let session_id = match request.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let generated = Uuid::new_v4().to_string();
            info!(
                event_name = "server.chat.session_started",
                session_id = %generated,
                "issued new session id"
            );
            generated
        }
    };

    let reply = state.runtime.handle_turn(&session_id, message).await;
    Ok(Json(ChatResponse { session_id, reply }))
}

async fn reset_session(
    State(state): State<ChatState>,
    Path(session_id): Path<String>,
) -> Result<Json<ResetResponse>, ChatRejection> {
    if session_id.trim().is_empty() {
        return Err(invalid("unassigned", "session id must not be empty"));
    }
    state.runtime.reset_session(&session_id).await;
    Ok(Json(ResetResponse { session_id, reset: true }))
}

fn invalid(correlation_id: &str, reason: &str) -> ChatRejection {
    let error = ApplicationError::from(DomainError::InvariantViolation(reason.to_string()))
        .into_interface(correlation_id);
    rejection(error)
}

fn rejection(error: InterfaceError) -> ChatRejection {
    warn!(
        event_name = "server.chat.rejected",
        correlation_id = error.correlation_id(),
        error = %error,
        "chat request rejected"
    );
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ChatError {
        error: error.user_message(),
        correlation_id: error.correlation_id().to_string(),
    };
    (status, Json(body))
}
