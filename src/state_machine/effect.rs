//! Effects produced by state transitions

use crate::state_machine::state::{Message, ToolCall};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a message to the transcript
    AppendMessage(Message),

    /// Ask the oracle for the next step
    RequestOracle,

    /// Dispatch a tool call through the registry
    DispatchTool { call: ToolCall },

    /// Write the conversation to the checkpoint store
    PersistState,
}

impl Effect {
    pub fn append_user(text: impl Into<String>) -> Self {
        Effect::AppendMessage(Message::user(text))
    }

    pub fn append_assistant(text: impl Into<String>) -> Self {
        Effect::AppendMessage(Message::assistant(text))
    }

    pub fn append_tool_call(call: ToolCall) -> Self {
        Effect::AppendMessage(Message::assistant_tool_call(call))
    }

    pub fn append_tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Effect::AppendMessage(Message::tool_result(tool_call_id, content))
    }

    pub fn dispatch(call: ToolCall) -> Self {
        Effect::DispatchTool { call }
    }
}
