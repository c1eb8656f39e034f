//! Tool registry
//!
//! Tools are stateless singletons. They validate their own input against a
//! declared schema and never touch a conversation: staging tools return a
//! [`PendingAction`] and leave the decision to the state machine.

mod purchase;
mod quote;
mod schema;

pub use purchase::StagePurchaseTool;
pub use quote::{AlphaVantageQuotes, QuoteSource, QuoteTool, StaticQuotes};
pub use schema::ToolSchema;

use crate::oracle::ToolDescriptor;
use crate::state_machine::state::format_amount;
use crate::state_machine::{PendingAction, ToolOutcome};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Number(f64),
    Staged(PendingAction),
}

impl ToolOutput {
    /// Tool message content for this output
    pub fn render(&self) -> String {
        match self {
            ToolOutput::Number(value) => format_amount(*value),
            ToolOutput::Staged(action) => action.to_token(),
        }
    }

    pub fn into_outcome(self) -> ToolOutcome {
        match self {
            ToolOutput::Staged(action) => ToolOutcome::Staged(action),
            other => ToolOutcome::Output(other.render()),
        }
    }
}

/// Tool failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("Price unavailable for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },
}

impl ToolError {
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn price_unavailable(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::PriceUnavailable {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error goes back to the oracle as a tool message instead
    /// of failing the turn
    pub fn is_fed_back(&self) -> bool {
        matches!(
            self,
            ToolError::UnknownTool(_) | ToolError::InvalidArguments { .. }
        )
    }
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &'static str;

    /// Tool description for the oracle
    fn description(&self) -> String;

    /// Declared arguments
    fn schema(&self) -> ToolSchema;

    /// Execute with arguments that already passed [`ToolSchema::validate`]
    async fn run(&self, args: Value) -> Result<ToolOutput, ToolError>;
}

/// Collection of tools available to conversations
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// `quote` backed by `quotes`, plus `stage_purchase`
    pub fn trading(quotes: Arc<dyn QuoteSource>) -> Self {
        Self::new(vec![
            Arc::new(QuoteTool::new(quotes)),
            Arc::new(StagePurchaseTool),
        ])
    }

    /// Trading tools over the fixed price table
    pub fn standard() -> Self {
        Self::trading(Arc::new(StaticQuotes))
    }

    /// Get all tool descriptors for the oracle
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.schema().to_json_schema(),
            })
            .collect()
    }

    /// Validate and run a tool by name
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.schema().validate(name, &args)?;
        tool.run(args).await
    }
}
