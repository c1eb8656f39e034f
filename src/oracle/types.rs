//! Common types for oracle interactions

use crate::state_machine::ToolCall;
use serde::{Deserialize, Serialize};

/// What the oracle decided to do next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OracleReply {
    /// Plain assistant text that ends the turn
    FinalAnswer { text: String },
    /// One or more tool invocations, to be dispatched in order
    ToolCallRequest { calls: Vec<ToolCall> },
}

impl OracleReply {
    pub fn final_answer(text: impl Into<String>) -> Self {
        OracleReply::FinalAnswer { text: text.into() }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        OracleReply::ToolCallRequest { calls }
    }
}

/// Oracle reply plus accounting
#[derive(Debug, Clone)]
pub struct OracleResponse {
    pub reply: OracleReply,
    pub usage: Usage,
}

impl OracleResponse {
    pub fn new(reply: OracleReply) -> Self {
        Self {
            reply,
            usage: Usage::default(),
        }
    }
}

/// Token usage reported by the oracle
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Tool description offered to the oracle
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}
