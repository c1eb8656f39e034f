//! Oracle abstraction
//!
//! The oracle is the remote reasoning service that reads the transcript and
//! either answers or asks for tools. Everything behind this trait is a black
//! box to the rest of the crate.

mod error;
mod openai;
mod types;

pub use error::OracleError;
pub use openai::{OpenAIOracle, DEFAULT_MODEL};
pub use types::*;

use crate::state_machine::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Common interface for oracle clients
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Ask for the next step given the transcript and the available tools
    async fn complete(
        &self,
        transcript: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<OracleResponse, OracleError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for oracle clients
pub struct LoggingOracle {
    inner: Arc<dyn Oracle>,
    model_id: String,
}

impl LoggingOracle {
    pub fn new(inner: Arc<dyn Oracle>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl Oracle for LoggingOracle {
    async fn complete(
        &self,
        transcript: &[Message],
        tools: &[ToolDescriptor],
    ) -> Result<OracleResponse, OracleError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(transcript, tools).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                let tool_calls = match &response.reply {
                    OracleReply::FinalAnswer { .. } => 0,
                    OracleReply::ToolCallRequest { calls } => calls.len(),
                };
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    tool_calls,
                    "Oracle request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Oracle request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
