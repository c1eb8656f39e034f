//! Turn executor
//!
//! Feeds events through the pure transition function and carries out the
//! effects it asks for. Runs until the state machine stops producing
//! events, which happens only at a terminal state or on error.

use super::traits::{CheckpointStore, ToolExecutor};
use super::{AgentError, AgentRuntime};
use crate::db::Conversation;
use crate::oracle::{Oracle, OracleReply};
use crate::state_machine::{transition, ConvContext, Effect, Event, ToolOutcome, TransitionError};
use chrono::Utc;
use std::time::Duration;

/// Ceiling on a server-provided retry delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

impl<S, O, T> AgentRuntime<S, O, T>
where
    S: CheckpointStore,
    O: Oracle,
    T: ToolExecutor,
{
    /// Drive `conv` from `event` to a terminal state.
    ///
    /// On error `conv` is left half-updated; callers must discard it.
    pub(super) async fn run_turn(
        &self,
        conv: &mut Conversation,
        event: Event,
    ) -> Result<(), AgentError> {
        let start = std::time::Instant::now();
        let result = self.process_events(conv, event).await;

        match &result {
            Ok(()) => tracing::info!(
                session_id = %conv.session_id,
                status = %conv.status(),
                messages = conv.transcript.len(),
                duration_ms = %start.elapsed().as_millis(),
                "Turn finished"
            ),
            Err(e) => tracing::warn!(
                session_id = %conv.session_id,
                error = %e,
                duration_ms = %start.elapsed().as_millis(),
                "Turn failed, checkpoint left unchanged"
            ),
        }
        result
    }

    async fn process_events(&self, conv: &mut Conversation, event: Event) -> Result<(), AgentError> {
        let mut events_to_process = vec![event];

        while let Some(current_event) = events_to_process.pop() {
            let context = ConvContext::new(self.config.max_tool_rounds)
                .with_transcript_len(conv.transcript.len());

            // Pure state transition
            let result = transition(&conv.state, &context, current_event)
                .map_err(|e| transition_error(&conv.session_id, e))?;

            conv.state = result.new_state;

            // Execute effects and collect generated events
            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(conv, effect).await? {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(())
    }

    async fn execute_effect(
        &self,
        conv: &mut Conversation,
        effect: Effect,
    ) -> Result<Option<Event>, AgentError> {
        match effect {
            Effect::AppendMessage(message) => {
                conv.transcript.push(message);
                Ok(None)
            }

            Effect::RequestOracle => {
                let reply = self.call_oracle(conv).await?;
                Ok(Some(Event::OracleReply(reply)))
            }

            Effect::DispatchTool { call } => {
                tracing::info!(
                    session_id = %conv.session_id,
                    tool = %call.name,
                    tool_call_id = %call.id,
                    "Dispatching tool"
                );
                let outcome = match self.tools.dispatch(&call.name, call.arguments).await {
                    Ok(output) => output.into_outcome(),
                    Err(e) if e.is_fed_back() => {
                        tracing::warn!(tool = %call.name, error = %e, "Tool error returned to oracle");
                        ToolOutcome::Failed(e.to_string())
                    }
                    Err(e) => return Err(e.into()),
                };
                Ok(Some(Event::ToolComplete {
                    tool_call_id: call.id,
                    outcome,
                }))
            }

            Effect::PersistState => {
                conv.updated_at = Utc::now();
                self.store.save(conv).await?;
                tracing::info!(
                    session_id = %conv.session_id,
                    status = %conv.status(),
                    "Checkpoint written"
                );
                if let Some(action) = conv.pending_action() {
                    tracing::info!(
                        session_id = %conv.session_id,
                        action = %action.to_token(),
                        "Suspended awaiting decision"
                    );
                }
                Ok(None)
            }
        }
    }

    /// One oracle call with timeout and bounded retry of retryable errors
    async fn call_oracle(&self, conv: &Conversation) -> Result<OracleReply, AgentError> {
        let descriptors = self.tools.descriptors();
        let max_attempts = self.config.oracle_max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let call = self.oracle.complete(conv.transcript.messages(), &descriptors);
            let error = match tokio::time::timeout(self.config.oracle_timeout, call).await {
                Err(_) => return Err(AgentError::OracleTimeout(self.config.oracle_timeout)),
                Ok(Ok(response)) => return Ok(response.reply),
                Ok(Err(e)) => e,
            };

            if !error.kind.is_retryable() || attempt >= max_attempts {
                return Err(AgentError::OracleUnavailable {
                    attempts: attempt,
                    message: error.message,
                });
            }

            let delay = error
                .retry_after
                .unwrap_or(self.config.retry_backoff)
                .min(MAX_RETRY_DELAY);
            tracing::warn!(
                session_id = %conv.session_id,
                attempt,
                delay_ms = %delay.as_millis(),
                error = %error,
                "Retrying oracle request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn transition_error(session_id: &str, e: TransitionError) -> AgentError {
    match e {
        TransitionError::ConversationBusy => AgentError::ConversationBusy(session_id.to_string()),
        TransitionError::NoPendingDecision => AgentError::NoPendingDecision(session_id.to_string()),
        TransitionError::ToolLoopExceeded { limit } => AgentError::ToolLoopExceeded { limit },
        TransitionError::InvalidTransition(msg) => AgentError::InvalidTransition(msg),
    }
}
