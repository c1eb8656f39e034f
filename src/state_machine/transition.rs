//! Pure state transition function

use super::event::ToolOutcome;
use super::state::{ResumePoint, ToolCall};
use super::{ConvContext, ConvState, Decision, Effect, Event};
use crate::oracle::OracleReply;
use thiserror::Error;

/// Content recorded for tool calls that were never dispatched because an
/// earlier call in the same batch suspended the turn
pub const SKIPPED_TOOL_MESSAGE: &str = "Skipped: another action is awaiting human approval";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Conversation is busy (a turn is running or a decision is pending)")]
    ConversationBusy,
    #[error("No decision is pending for this conversation")]
    NoPendingDecision,
    #[error("Tool loop exceeded {limit} rounds without a final answer")]
    ToolLoopExceeded { limit: u32 },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs and performs
/// no I/O. Effects are listed in the order the runtime must apply them.
#[allow(clippy::too_many_lines)]
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Turn start
        // ============================================================

        (ConvState::Idle | ConvState::Completed, Event::UserMessage { text }) => {
            Ok(TransitionResult::new(ConvState::AwaitingOracle { round: 0 })
                .with_effect(Effect::append_user(text))
                .with_effect(Effect::RequestOracle))
        }

        (ConvState::Completed, Event::Continue) => {
            Ok(TransitionResult::new(ConvState::AwaitingOracle { round: 0 })
                .with_effect(Effect::RequestOracle))
        }

        (ConvState::Idle, Event::Continue) => Err(TransitionError::InvalidTransition(
            "Nothing to continue: conversation has no turns yet".to_string(),
        )),

        // Anything mid-turn or suspended refuses new input
        (
            ConvState::AwaitingOracle { .. }
            | ConvState::ToolExecuting { .. }
            | ConvState::AwaitingDecision { .. },
            Event::UserMessage { .. } | Event::Continue,
        ) => Err(TransitionError::ConversationBusy),

        // ============================================================
        // Oracle replies
        // ============================================================

        (ConvState::AwaitingOracle { .. }, Event::OracleReply(OracleReply::FinalAnswer { text })) => {
            Ok(TransitionResult::new(ConvState::Completed)
                .with_effect(Effect::append_assistant(text))
                .with_effect(Effect::PersistState))
        }

        (ConvState::AwaitingOracle { round }, Event::OracleReply(OracleReply::ToolCallRequest { calls })) => {
            if *round >= context.max_tool_rounds {
                return Err(TransitionError::ToolLoopExceeded {
                    limit: context.max_tool_rounds,
                });
            }
            let mut calls = calls.into_iter();
            let Some(first) = calls.next() else {
                return Err(TransitionError::InvalidTransition(
                    "Oracle requested an empty batch of tool calls".to_string(),
                ));
            };
            let remaining: Vec<ToolCall> = calls.collect();

            let announce: Vec<Effect> = std::iter::once(first.clone())
                .chain(remaining.iter().cloned())
                .map(Effect::append_tool_call)
                .collect();

            Ok(TransitionResult::new(ConvState::ToolExecuting {
                round: round + 1,
                current_tool: first.clone(),
                remaining_tools: remaining,
            })
            .with_effects(announce)
            .with_effect(Effect::dispatch(first)))
        }

        // ============================================================
        // Tool results
        // ============================================================

        (ConvState::ToolExecuting { current_tool, .. }, Event::ToolComplete { tool_call_id, .. })
            if tool_call_id != current_tool.id =>
        {
            Err(TransitionError::InvalidTransition(format!(
                "Result for tool call {tool_call_id} while {} is executing",
                current_tool.id
            )))
        }

        // Staged action -> suspend. Undispatched calls get synthetic results.
        (
            ConvState::ToolExecuting {
                current_tool,
                remaining_tools,
                ..
            },
            Event::ToolComplete {
                tool_call_id,
                outcome: ToolOutcome::Staged(pending_action),
            },
        ) => {
            let resume_point = ResumePoint::approval(&current_tool.id, context.transcript_len);
            let skipped = remaining_tools
                .iter()
                .map(|t| Effect::append_tool_result(&t.id, SKIPPED_TOOL_MESSAGE));

            Ok(TransitionResult::new(ConvState::AwaitingDecision {
                pending_action: pending_action.clone(),
                resume_point,
            })
            .with_effect(Effect::append_tool_result(
                tool_call_id,
                pending_action.to_token(),
            ))
            .with_effects(skipped)
            .with_effect(Effect::PersistState))
        }

        // More tools in this batch -> next tool
        (
            ConvState::ToolExecuting {
                round,
                remaining_tools,
                ..
            },
            Event::ToolComplete {
                tool_call_id,
                outcome,
            },
        ) if !remaining_tools.is_empty() => {
            let next = remaining_tools[0].clone();
            let rest = remaining_tools[1..].to_vec();

            Ok(TransitionResult::new(ConvState::ToolExecuting {
                round: *round,
                current_tool: next.clone(),
                remaining_tools: rest,
            })
            .with_effect(Effect::append_tool_result(
                tool_call_id,
                outcome.message_content(),
            ))
            .with_effect(Effect::dispatch(next)))
        }

        // Last tool of the batch -> back to the oracle
        (ConvState::ToolExecuting { round, .. }, Event::ToolComplete { tool_call_id, outcome }) => {
            Ok(TransitionResult::new(ConvState::AwaitingOracle { round: *round })
                .with_effect(Effect::append_tool_result(
                    tool_call_id,
                    outcome.message_content(),
                ))
                .with_effect(Effect::RequestOracle))
        }

        // ============================================================
        // Approval step
        // ============================================================

        (ConvState::AwaitingDecision { pending_action, .. }, Event::Decision(decision)) => {
            let reply = match decision {
                Decision::Approve => pending_action.confirmation(),
                Decision::Reject => pending_action.decline(),
            };
            Ok(TransitionResult::new(ConvState::Completed)
                .with_effect(Effect::append_assistant(reply))
                .with_effect(Effect::PersistState))
        }

        (_, Event::Decision(_)) => Err(TransitionError::NoPendingDecision),

        // ============================================================
        // Invalid Transitions
        // ============================================================

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {state:?} with event {event:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::state::{Message, PendingAction, DEFAULT_MAX_TOOL_ROUNDS};
    use serde_json::json;

    fn test_context() -> ConvContext {
        ConvContext::new(DEFAULT_MAX_TOOL_ROUNDS)
    }

    fn quote_call(id: &str) -> ToolCall {
        ToolCall::new(id, "quote", json!({"symbol": "AAPL"}))
    }

    fn suspended() -> ConvState {
        ConvState::AwaitingDecision {
            pending_action: PendingAction::purchase("MSFT", 10, 2003.0),
            resume_point: ResumePoint::approval("call-1", 2),
        }
    }

    #[test]
    fn test_idle_user_message_requests_oracle() {
        let result = transition(
            &ConvState::Idle,
            &test_context(),
            Event::UserMessage {
                text: "Hello".to_string(),
            },
        )
        .unwrap();

        assert_eq!(result.new_state, ConvState::AwaitingOracle { round: 0 });
        assert_eq!(
            result.effects,
            vec![
                Effect::AppendMessage(Message::user("Hello")),
                Effect::RequestOracle
            ]
        );
    }

    #[test]
    fn test_completed_accepts_new_turn() {
        let result = transition(
            &ConvState::Completed,
            &test_context(),
            Event::UserMessage {
                text: "again".to_string(),
            },
        )
        .unwrap();
        assert_eq!(result.new_state, ConvState::AwaitingOracle { round: 0 });
    }

    #[test]
    fn test_reject_message_while_suspended() {
        let result = transition(
            &suspended(),
            &test_context(),
            Event::UserMessage {
                text: "Hello".to_string(),
            },
        );
        assert_eq!(result.unwrap_err(), TransitionError::ConversationBusy);
    }

    #[test]
    fn test_final_answer_completes_and_persists() {
        let result = transition(
            &ConvState::AwaitingOracle { round: 3 },
            &test_context(),
            Event::OracleReply(OracleReply::FinalAnswer {
                text: "done".to_string(),
            }),
        )
        .unwrap();

        assert_eq!(result.new_state, ConvState::Completed);
        assert!(result.effects.contains(&Effect::PersistState));
    }

    #[test]
    fn test_tool_request_announces_all_calls_and_dispatches_first() {
        let result = transition(
            &ConvState::AwaitingOracle { round: 0 },
            &test_context(),
            Event::OracleReply(OracleReply::ToolCallRequest {
                calls: vec![quote_call("a"), quote_call("b")],
            }),
        )
        .unwrap();

        match &result.new_state {
            ConvState::ToolExecuting {
                round,
                current_tool,
                remaining_tools,
            } => {
                assert_eq!(*round, 1);
                assert_eq!(current_tool.id, "a");
                assert_eq!(remaining_tools.len(), 1);
            }
            other => panic!("Expected ToolExecuting, got {other:?}"),
        }
        assert_eq!(result.effects.len(), 3);
        assert_eq!(result.effects[2], Effect::dispatch(quote_call("a")));
    }

    #[test]
    fn test_tool_round_limit() {
        let result = transition(
            &ConvState::AwaitingOracle {
                round: DEFAULT_MAX_TOOL_ROUNDS,
            },
            &test_context(),
            Event::OracleReply(OracleReply::ToolCallRequest {
                calls: vec![quote_call("a")],
            }),
        );
        assert_eq!(
            result.unwrap_err(),
            TransitionError::ToolLoopExceeded {
                limit: DEFAULT_MAX_TOOL_ROUNDS
            }
        );
    }

    #[test]
    fn test_staged_action_suspends_and_skips_rest() {
        let ctx = test_context().with_transcript_len(4);
        let action = PendingAction::purchase("MSFT", 10, 2003.0);
        let result = transition(
            &ConvState::ToolExecuting {
                round: 1,
                current_tool: ToolCall::new("buy", "stage_purchase", json!({})),
                remaining_tools: vec![quote_call("later")],
            },
            &ctx,
            Event::ToolComplete {
                tool_call_id: "buy".to_string(),
                outcome: ToolOutcome::Staged(action.clone()),
            },
        )
        .unwrap();

        assert_eq!(
            result.new_state,
            ConvState::AwaitingDecision {
                pending_action: action.clone(),
                resume_point: ResumePoint::approval("buy", 4),
            }
        );
        assert_eq!(
            result.effects,
            vec![
                Effect::append_tool_result("buy", action.to_token()),
                Effect::append_tool_result("later", SKIPPED_TOOL_MESSAGE),
                Effect::PersistState,
            ]
        );
    }

    #[test]
    fn test_mismatched_tool_result_rejected() {
        let result = transition(
            &ConvState::ToolExecuting {
                round: 1,
                current_tool: quote_call("a"),
                remaining_tools: vec![],
            },
            &test_context(),
            Event::ToolComplete {
                tool_call_id: "zzz".to_string(),
                outcome: ToolOutcome::Output("1.0".to_string()),
            },
        );
        assert!(matches!(result, Err(TransitionError::InvalidTransition(_))));
    }

    #[test]
    fn test_failed_tool_is_reported_to_oracle() {
        let result = transition(
            &ConvState::ToolExecuting {
                round: 2,
                current_tool: quote_call("a"),
                remaining_tools: vec![],
            },
            &test_context(),
            Event::ToolComplete {
                tool_call_id: "a".to_string(),
                outcome: ToolOutcome::Failed("Unknown tool: nope".to_string()),
            },
        )
        .unwrap();

        assert_eq!(result.new_state, ConvState::AwaitingOracle { round: 2 });
        assert_eq!(
            result.effects,
            vec![
                Effect::append_tool_result("a", "Error: Unknown tool: nope"),
                Effect::RequestOracle
            ]
        );
    }

    #[test]
    fn test_approve_and_reject_produce_distinct_messages() {
        let approve = transition(&suspended(), &test_context(), Event::Decision(Decision::Approve)).unwrap();
        let reject = transition(&suspended(), &test_context(), Event::Decision(Decision::Reject)).unwrap();

        assert_eq!(approve.new_state, ConvState::Completed);
        assert_eq!(reject.new_state, ConvState::Completed);
        assert_ne!(approve.effects[0], reject.effects[0]);
        assert_eq!(
            approve.effects[0],
            Effect::append_assistant("Approved: Bought 10 shares of MSFT for 2003.0")
        );
    }

    #[test]
    fn test_decision_without_pending_action() {
        for state in [ConvState::Idle, ConvState::Completed, ConvState::AwaitingOracle { round: 1 }] {
            let result = transition(&state, &test_context(), Event::Decision(Decision::Approve));
            assert_eq!(result.unwrap_err(), TransitionError::NoPendingDecision);
        }
    }
}
