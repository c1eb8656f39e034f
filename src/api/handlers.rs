//! HTTP request handlers

use super::types::{
    DecisionRequest, ErrorResponse, SessionListResponse, SessionResponse, SuccessResponse,
    TurnRequest,
};
use super::AppState;
use crate::runtime::{AgentError, TurnOutcome};
use crate::state_machine::Decision;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session listing
        .route("/api/sessions", get(list_sessions))
        // Session retrieval and removal
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        // Turns and decisions
        .route("/api/sessions/:id/turns", post(advance_session))
        .route("/api/sessions/:id/decision", post(decide_session))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state.runtime.list().await?;
    Ok(Json(SessionListResponse { sessions }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let conversation = state.runtime.get(&id).await?;
    Ok(Json(conversation.into()))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.runtime.delete(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Turns
// ============================================================

async fn advance_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    let message = req.message.filter(|m| !m.trim().is_empty());
    let outcome = state.runtime.advance(&id, message).await?;
    Ok(Json(outcome))
}

/// Accepts `approve`/`reject` as well as `yes`/`no` in any case
async fn decide_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    let decision = Decision::normalize(&req.decision);
    let outcome = state.runtime.resume(&id, &decision).await?;
    Ok(Json(outcome))
}

async fn get_version() -> &'static str {
    concat!("approval-agent ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

struct AppError(AgentError);

impl From<AgentError> for AppError {
    fn from(e: AgentError) -> Self {
        Self(e)
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AgentError::ConversationBusy(_) | AgentError::NoPendingDecision(_) => {
                StatusCode::CONFLICT
            }
            AgentError::InvalidDecision(_) => StatusCode::BAD_REQUEST,
            AgentError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            AgentError::ToolLoopExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AgentError::OracleUnavailable { .. } | AgentError::PriceUnavailable { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AgentError::OracleTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AgentError::Store(_)
            | AgentError::CorruptCheckpoint { .. }
            | AgentError::InvalidTransition(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = %status, "Request failed");
        }

        let body = Json(ErrorResponse::new(self.0.to_string()));
        (status, body).into_response()
    }
}
