//! API request and response types

use crate::db::{Conversation, SessionSummary};
use crate::state_machine::{Message, PendingAction, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to run a turn. No message means "continue".
#[derive(Debug, Default, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub message: Option<String>,
}

/// Request to settle a pending action
#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: String,
}

/// Response with a list of sessions
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Full view of one session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Conversation> for SessionResponse {
    fn from(conv: Conversation) -> Self {
        let pending_action = conv.pending_action().cloned();
        Self {
            session_id: conv.session_id.clone(),
            status: conv.status(),
            prompt: pending_action.as_ref().map(PendingAction::approval_prompt),
            pending_action,
            messages: conv.transcript.messages().to_vec(),
            created_at: conv.created_at,
            updated_at: conv.updated_at,
        }
    }
}

/// Generic success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
