//! Checkpoint schema and record types

use crate::state_machine::{ConvState, PendingAction, Status, Transcript};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version written into every snapshot. Bump when the layout of
/// [`Conversation`] changes incompatibly.
pub const FORMAT_VERSION: u32 = 1;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS checkpoints (
    session_id TEXT PRIMARY KEY,
    format_version INTEGER NOT NULL,
    status TEXT NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    snapshot TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_updated ON checkpoints(updated_at DESC);
";

/// Everything needed to continue a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub transcript: Transcript,
    pub state: ConvState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Fresh, idle conversation
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            transcript: Transcript::new(),
            state: ConvState::Idle,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        self.state.pending_action()
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            status: self.status(),
            message_count: self.transcript.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Self-describing serialized form of a [`Conversation`]
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    #[serde(flatten)]
    pub conversation: Conversation,
}

impl Snapshot {
    pub fn encode(conversation: &Conversation) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            format_version: u32,
            #[serde(flatten)]
            conversation: &'a Conversation,
        }
        serde_json::to_string(&Borrowed {
            format_version: FORMAT_VERSION,
            conversation,
        })
    }

    /// Parse and version-check a stored snapshot
    pub fn decode(json: &str) -> Result<Conversation, String> {
        let snapshot: Snapshot = serde_json::from_str(json).map_err(|e| e.to_string())?;
        if snapshot.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                snapshot.format_version
            ));
        }
        Ok(snapshot.conversation)
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub status: Status,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}
