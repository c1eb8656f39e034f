//! Runtime for executing conversations
//!
//! Owns the checkpoint store, the oracle and the tool executor, and drives
//! the pure state machine for one session at a time. Every turn runs on a
//! working copy of the conversation; the store only ever sees terminal
//! states, so a failed turn leaves the previous checkpoint in place.

mod executor;
mod locks;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::*;

use crate::db::{Conversation, SessionSummary, StoreError};
use crate::oracle::Oracle;
use crate::state_machine::state::DEFAULT_MAX_TOOL_ROUNDS;
use crate::state_machine::{ConvState, Decision, Event, InvalidDecision, PendingAction};
use crate::tools::{ToolError, ToolRegistry};
use locks::SessionLocks;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Type alias for the runtime the binaries assemble
pub type ProductionRuntime =
    AgentRuntime<Arc<dyn CheckpointStore>, Arc<dyn Oracle>, ToolRegistry>;

/// Runtime tunables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Oracle tool-call rounds allowed per turn
    pub max_tool_rounds: u32,
    /// Upper bound on a single oracle call
    pub oracle_timeout: Duration,
    /// Total attempts per oracle call, retries included
    pub oracle_max_attempts: u32,
    /// Delay between attempts when the oracle gives no hint
    pub retry_backoff: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            oracle_timeout: Duration::from_secs(60),
            oracle_max_attempts: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Errors surfaced to drivers
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Session {0} is busy: a turn is running or a decision is pending")]
    ConversationBusy(String),
    #[error("Session {0} has no pending decision")]
    NoPendingDecision(String),
    #[error(transparent)]
    InvalidDecision(#[from] InvalidDecision),
    #[error("Tool loop exceeded {limit} rounds without a final answer")]
    ToolLoopExceeded { limit: u32 },
    #[error("Oracle unavailable after {attempts} attempt(s): {message}")]
    OracleUnavailable { attempts: u32, message: String },
    #[error("Oracle did not answer within {}s", .0.as_secs_f64())]
    OracleTimeout(Duration),
    #[error("Price unavailable for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Checkpoint store failure: {0}")]
    Store(StoreError),
    #[error("Corrupt checkpoint for session {session_id}: {reason}")]
    CorruptCheckpoint { session_id: String, reason: String },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl From<StoreError> for AgentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Corrupt { session_id, reason } => {
                AgentError::CorruptCheckpoint { session_id, reason }
            }
            other => AgentError::Store(other),
        }
    }
}

impl From<ToolError> for AgentError {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::PriceUnavailable { symbol, reason } => {
                AgentError::PriceUnavailable { symbol, reason }
            }
            other => AgentError::InvalidTransition(other.to_string()),
        }
    }
}

/// What a driver sees after `advance` or `resume`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed {
        reply: String,
    },
    AwaitingDecision {
        pending_action: PendingAction,
        prompt: String,
    },
}

impl TurnOutcome {
    fn from_conversation(conv: &Conversation) -> Result<Self, AgentError> {
        match &conv.state {
            ConvState::Completed => Ok(TurnOutcome::Completed {
                reply: conv
                    .transcript
                    .last_assistant_text()
                    .unwrap_or_default()
                    .to_string(),
            }),
            ConvState::AwaitingDecision { pending_action, .. } => {
                Ok(TurnOutcome::AwaitingDecision {
                    prompt: pending_action.approval_prompt(),
                    pending_action: pending_action.clone(),
                })
            }
            other => Err(AgentError::InvalidTransition(format!(
                "Turn ended in non-terminal state {other:?}"
            ))),
        }
    }
}

/// Session manager: the single entry point drivers talk to
pub struct AgentRuntime<S, O, T>
where
    S: CheckpointStore,
    O: Oracle,
    T: ToolExecutor,
{
    store: S,
    oracle: O,
    tools: T,
    config: RuntimeConfig,
    locks: SessionLocks,
}

impl<S, O, T> AgentRuntime<S, O, T>
where
    S: CheckpointStore,
    O: Oracle,
    T: ToolExecutor,
{
    pub fn new(store: S, oracle: O, tools: T, config: RuntimeConfig) -> Self {
        Self {
            store,
            oracle,
            tools,
            config,
            locks: SessionLocks::default(),
        }
    }

    /// Run one turn for `session_id`.
    ///
    /// With `Some(text)` the message starts a new turn (creating the session
    /// on first use). With `None` the oracle is asked again on the existing
    /// transcript, which only a completed conversation allows.
    pub async fn advance(
        &self,
        session_id: &str,
        message: Option<String>,
    ) -> Result<TurnOutcome, AgentError> {
        let _guard = self
            .locks
            .try_acquire(session_id)
            .ok_or_else(|| AgentError::ConversationBusy(session_id.to_string()))?;

        let stored = self.store.load(session_id).await?;
        let mut working = match (stored, &message) {
            (Some(conv), _) => conv,
            (None, Some(_)) => Conversation::new(session_id),
            (None, None) => return Err(AgentError::SessionNotFound(session_id.to_string())),
        };

        let event = match message {
            Some(text) => Event::UserMessage { text },
            None => Event::Continue,
        };

        tracing::info!(
            session_id = %session_id,
            status = %working.status(),
            messages = working.transcript.len(),
            "Turn started"
        );

        self.run_turn(&mut working, event).await?;
        TurnOutcome::from_conversation(&working)
    }

    /// Apply a human decision to a suspended conversation.
    ///
    /// `decision` must be exactly `approve` or `reject`; drivers normalize
    /// user input with [`Decision::normalize`] first.
    pub async fn resume(&self, session_id: &str, decision: &str) -> Result<TurnOutcome, AgentError> {
        let _guard = self
            .locks
            .try_acquire(session_id)
            .ok_or_else(|| AgentError::ConversationBusy(session_id.to_string()))?;

        let mut working = self
            .store
            .load(session_id)
            .await?
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))?;

        let ConvState::AwaitingDecision {
            pending_action,
            resume_point,
        } = &working.state
        else {
            return Err(AgentError::NoPendingDecision(session_id.to_string()));
        };

        let decision: Decision = decision.parse()?;

        if !resume_point.matches(&working.transcript, pending_action) {
            return Err(AgentError::CorruptCheckpoint {
                session_id: session_id.to_string(),
                reason: format!(
                    "resume point {}@{} does not address the staged action",
                    resume_point.tool_call_id, resume_point.message_index
                ),
            });
        }

        tracing::info!(
            session_id = %session_id,
            decision = %decision,
            action = pending_action.kind(),
            "Resuming suspended conversation"
        );

        self.run_turn(&mut working, Event::Decision(decision)).await?;
        TurnOutcome::from_conversation(&working)
    }

    /// Current checkpoint for a session
    pub async fn get(&self, session_id: &str) -> Result<Conversation, AgentError> {
        self.store
            .load(session_id)
            .await?
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))
    }

    /// Remove a session. Waits for any running turn to finish first.
    pub async fn delete(&self, session_id: &str) -> Result<(), AgentError> {
        let _guard = self.locks.acquire(session_id).await;
        let existed = self.store.delete(session_id).await?;

        if existed {
            tracing::info!(session_id = %session_id, "Session deleted");
            Ok(())
        } else {
            Err(AgentError::SessionNotFound(session_id.to_string()))
        }
    }

    pub async fn list(&self) -> Result<Vec<SessionSummary>, AgentError> {
        Ok(self.store.list().await?)
    }
}
