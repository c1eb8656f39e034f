//! Events that can occur in a conversation

use crate::oracle::OracleReply;
use crate::state_machine::state::{Decision, PendingAction};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Driver events
    UserMessage {
        text: String,
    },
    /// Re-run the oracle on the existing transcript without new input
    Continue,
    Decision(Decision),

    // Oracle events
    OracleReply(OracleReply),

    // Tool events
    ToolComplete {
        tool_call_id: String,
        outcome: ToolOutcome,
    },
}

/// What a dispatched tool call produced, as seen by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Plain result, fed back to the oracle
    Output(String),
    /// Recoverable failure (unknown tool, bad arguments), fed back as an error
    Failed(String),
    /// A staged action that needs approval
    Staged(PendingAction),
}

impl ToolOutcome {
    /// Content of the tool message recorded for this outcome
    pub fn message_content(&self) -> String {
        match self {
            ToolOutcome::Output(text) => text.clone(),
            ToolOutcome::Failed(error) => format!("Error: {error}"),
            ToolOutcome::Staged(action) => action.to_token(),
        }
    }
}
