//! Conversation state types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default bound on oracle tool-call rounds within a single turn
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 25;

// ============================================================================
// Transcript
// ============================================================================

/// Who authored a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One transcript entry. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Present on assistant messages that request a tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// Present on tool messages; links back to the call being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            tool_call: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            tool_call: None,
            tool_call_id: None,
        }
    }

    pub fn assistant_tool_call(call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_call: Some(call),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Ordered, append-only sequence of messages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Text of the most recent plain assistant message (not a tool call)
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && m.tool_call.is_none())
            .map(|m| m.content.as_str())
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

// ============================================================================
// Pending Actions
// ============================================================================

const PURCHASE_TOKEN_PREFIX: &str = "REQUEST_BUY";
const TOKEN_SEPARATOR: &str = "::";

/// A staged side effect that needs a human decision before it takes effect.
///
/// Staging tools return one of these instead of acting. It travels through
/// the transcript as a token (see [`PendingAction::to_token`]) and is only
/// ever resolved by the state machine's approval step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingAction {
    /// Buy `quantity` shares of `symbol`; `price` is the total for the order
    Purchase {
        symbol: String,
        quantity: u32,
        price: f64,
    },
}

impl PendingAction {
    pub fn purchase(symbol: impl Into<String>, quantity: u32, price: f64) -> Self {
        PendingAction::Purchase {
            symbol: symbol.into(),
            quantity,
            price,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PendingAction::Purchase { .. } => "purchase",
        }
    }

    /// Serialize as tool-result content, e.g. `REQUEST_BUY::MSFT::10::2003.0`
    pub fn to_token(&self) -> String {
        match self {
            PendingAction::Purchase {
                symbol,
                quantity,
                price,
            } => [
                PURCHASE_TOKEN_PREFIX,
                symbol,
                &quantity.to_string(),
                &format_amount(*price),
            ]
            .join(TOKEN_SEPARATOR),
        }
    }

    /// Parse a token produced by [`PendingAction::to_token`]
    pub fn parse_token(token: &str) -> Option<Self> {
        let mut parts = token.trim().split(TOKEN_SEPARATOR);
        let prefix = parts.next()?;
        if prefix != PURCHASE_TOKEN_PREFIX {
            return None;
        }
        let symbol = parts.next()?;
        let quantity = parts.next()?.parse::<u32>().ok()?;
        let price = parts.next()?.parse::<f64>().ok()?;
        if parts.next().is_some() || symbol.is_empty() || !price.is_finite() {
            return None;
        }
        Some(PendingAction::purchase(symbol, quantity, price))
    }

    /// Question shown to the human approver
    pub fn approval_prompt(&self) -> String {
        match self {
            PendingAction::Purchase {
                symbol,
                quantity,
                price,
            } => format!("Approve buying {quantity} {symbol} stocks for ${price:.2}?"),
        }
    }

    /// Assistant message appended when the action is approved
    pub fn confirmation(&self) -> String {
        match self {
            PendingAction::Purchase {
                symbol,
                quantity,
                price,
            } => format!(
                "Approved: Bought {quantity} shares of {symbol} for {}",
                format_amount(*price)
            ),
        }
    }

    /// Assistant message appended when the action is rejected
    pub fn decline(&self) -> String {
        match self {
            PendingAction::Purchase { .. } => "Trade declined by human.".to_string(),
        }
    }
}

/// Render a monetary amount the way it is carried in tokens (`2003.0`, `100.4`)
pub fn format_amount(value: f64) -> String {
    format!("{value:?}")
}

// ============================================================================
// Suspension
// ============================================================================

/// Where a suspended conversation paused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Approval,
}

/// Serializable marker for the exact step a conversation is suspended at.
///
/// `message_index` addresses the tool message that carries the staged
/// action token; `tool_call_id` is the call that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub gate: Gate,
    pub tool_call_id: String,
    pub message_index: usize,
}

impl ResumePoint {
    pub fn approval(tool_call_id: impl Into<String>, message_index: usize) -> Self {
        Self {
            gate: Gate::Approval,
            tool_call_id: tool_call_id.into(),
            message_index,
        }
    }

    /// Check that this point still addresses the staged action in `transcript`
    pub fn matches(&self, transcript: &Transcript, pending: &PendingAction) -> bool {
        let Some(message) = transcript.get(self.message_index) else {
            return false;
        };
        message.role == Role::Tool
            && message.tool_call_id.as_deref() == Some(self.tool_call_id.as_str())
            && PendingAction::parse_token(&message.content).as_ref() == Some(pending)
    }
}

// ============================================================================
// Decisions
// ============================================================================

/// A human response to a pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid decision '{0}': expected 'approve' or 'reject'")]
pub struct InvalidDecision(pub String);

impl FromStr for Decision {
    type Err = InvalidDecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::Reject),
            other => Err(InvalidDecision(other.to_string())),
        }
    }
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Reject => "reject",
        }
    }

    /// Map what a person typed onto the wire vocabulary.
    ///
    /// `yes`/`no` (any case) become `approve`/`reject`; anything else is
    /// passed through trimmed and lowercased so that parsing can reject it.
    pub fn normalize(input: &str) -> String {
        let lowered = input.trim().to_lowercase();
        match lowered.as_str() {
            "yes" => Decision::Approve.as_str().to_string(),
            "no" => Decision::Reject.as_str().to_string(),
            _ => lowered,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// Conversation state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// Fresh conversation, no turn has run yet
    #[default]
    Idle,

    /// Oracle request in flight for the given tool round
    AwaitingOracle { round: u32 },

    /// Dispatching the tool calls of one oracle reply, in order
    ToolExecuting {
        round: u32,
        current_tool: ToolCall,
        remaining_tools: Vec<ToolCall>,
    },

    /// Suspended on a staged action
    AwaitingDecision {
        pending_action: PendingAction,
        resume_point: ResumePoint,
    },

    /// Turn finished with a final assistant message
    Completed,
}

/// Coarse lifecycle status exposed to drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Idle,
    Running,
    Suspended,
    Completed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Running => "running",
            Status::Suspended => "suspended",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConvState {
    pub fn status(&self) -> Status {
        match self {
            ConvState::Idle => Status::Idle,
            ConvState::AwaitingOracle { .. } | ConvState::ToolExecuting { .. } => Status::Running,
            ConvState::AwaitingDecision { .. } => Status::Suspended,
            ConvState::Completed => Status::Completed,
        }
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        match self {
            ConvState::AwaitingDecision { pending_action, .. } => Some(pending_action),
            _ => None,
        }
    }
}

/// Per-turn context for the transition function
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub max_tool_rounds: u32,
    /// Length of the transcript before the current event's effects apply
    pub transcript_len: usize,
}

impl ConvContext {
    pub fn new(max_tool_rounds: u32) -> Self {
        Self {
            max_tool_rounds,
            transcript_len: 0,
        }
    }

    #[must_use]
    pub fn with_transcript_len(mut self, transcript_len: usize) -> Self {
        self.transcript_len = transcript_len;
        self
    }
}
