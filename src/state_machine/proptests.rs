//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::event::ToolOutcome;
use super::state::{ResumePoint, DEFAULT_MAX_TOOL_ROUNDS};
use super::transition::*;
use super::*;
use crate::oracle::OracleReply;
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> ConvContext {
    ConvContext::new(DEFAULT_MAX_TOOL_ROUNDS)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_symbol() -> impl Strategy<Value = String> {
    "[A-Z]{1,5}"
}

fn arb_pending_action() -> impl Strategy<Value = PendingAction> {
    (arb_symbol(), 1u32..10_000, 0u32..100_000_000).prop_map(|(symbol, quantity, cents)| {
        PendingAction::purchase(symbol, quantity, f64::from(cents) / 100.0)
    })
}

fn arb_tool_call() -> impl Strategy<Value = ToolCall> {
    ("[a-z]{8}", prop_oneof![Just("quote"), Just("stage_purchase")], arb_symbol())
        .prop_map(|(id, name, symbol)| ToolCall::new(id, name, json!({ "symbol": symbol })))
}

fn arb_decision() -> impl Strategy<Value = Decision> {
    prop_oneof![Just(Decision::Approve), Just(Decision::Reject)]
}

fn arb_tool_outcome() -> impl Strategy<Value = ToolOutcome> {
    prop_oneof![
        "[0-9.]{1,8}".prop_map(ToolOutcome::Output),
        "[a-zA-Z ]{1,30}".prop_map(ToolOutcome::Failed),
        arb_pending_action().prop_map(ToolOutcome::Staged),
    ]
}

fn arb_oracle_reply() -> impl Strategy<Value = OracleReply> {
    prop_oneof![
        "[a-zA-Z ]{1,40}".prop_map(|text| OracleReply::FinalAnswer { text }),
        proptest::collection::vec(arb_tool_call(), 1..4)
            .prop_map(|calls| OracleReply::ToolCallRequest { calls }),
    ]
}

fn arb_busy_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        (0u32..DEFAULT_MAX_TOOL_ROUNDS).prop_map(|round| ConvState::AwaitingOracle { round }),
        (
            1u32..DEFAULT_MAX_TOOL_ROUNDS,
            arb_tool_call(),
            proptest::collection::vec(arb_tool_call(), 0..3)
        )
            .prop_map(|(round, current_tool, remaining_tools)| ConvState::ToolExecuting {
                round,
                current_tool,
                remaining_tools,
            }),
        (arb_pending_action(), "[a-z]{8}", 0usize..50).prop_map(|(pending_action, id, idx)| {
            ConvState::AwaitingDecision {
                pending_action,
                resume_point: ResumePoint::approval(id, idx),
            }
        }),
    ]
}

fn arb_state() -> impl Strategy<Value = ConvState> {
    prop_oneof![
        Just(ConvState::Idle),
        Just(ConvState::Completed),
        arb_busy_state(),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        "[a-zA-Z ]{1,30}".prop_map(|text| Event::UserMessage { text }),
        Just(Event::Continue),
        arb_decision().prop_map(Event::Decision),
        arb_oracle_reply().prop_map(Event::OracleReply),
        ("[a-z]{8}", arb_tool_outcome())
            .prop_map(|(tool_call_id, outcome)| Event::ToolComplete { tool_call_id, outcome }),
    ]
}

fn is_terminal(state: &ConvState) -> bool {
    matches!(
        state,
        ConvState::Completed | ConvState::AwaitingDecision { .. }
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // A running or suspended conversation never accepts new input
    #[test]
    fn prop_busy_rejects_messages(state in arb_busy_state(), text in "[a-zA-Z ]{1,30}") {
        let result = transition(&state, &test_context(), Event::UserMessage { text });
        prop_assert_eq!(result.unwrap_err(), TransitionError::ConversationBusy);

        let result = transition(&state, &test_context(), Event::Continue);
        prop_assert_eq!(result.unwrap_err(), TransitionError::ConversationBusy);
    }

    // Decisions only land on a suspended conversation
    #[test]
    fn prop_decision_requires_suspension(state in arb_state(), decision in arb_decision()) {
        let suspended = matches!(state, ConvState::AwaitingDecision { .. });
        let result = transition(&state, &test_context(), Event::Decision(decision));
        if suspended {
            let result = result.unwrap();
            prop_assert_eq!(result.new_state, ConvState::Completed);
            prop_assert!(result.effects.contains(&Effect::PersistState));
        } else {
            prop_assert_eq!(result.unwrap_err(), TransitionError::NoPendingDecision);
        }
    }

    // PersistState is emitted exactly when a turn reaches a terminal state
    #[test]
    fn prop_persist_only_on_terminal(state in arb_state(), event in arb_event()) {
        if let Ok(result) = transition(&state, &test_context(), event) {
            let persists = result.effects.contains(&Effect::PersistState);
            prop_assert_eq!(persists, is_terminal(&result.new_state));
        }
    }

    // Tool rounds never pass the configured bound
    #[test]
    fn prop_tool_rounds_bounded(
        max in 1u32..6,
        replies in proptest::collection::vec(arb_oracle_reply(), 1..20)
    ) {
        let ctx = ConvContext::new(max);
        let mut state = ConvState::AwaitingOracle { round: 0 };

        for reply in replies {
            let ConvState::AwaitingOracle { round } = state else { break };
            match transition(&state, &ctx, Event::OracleReply(reply)) {
                Ok(result) => {
                    state = result.new_state;
                    if let ConvState::ToolExecuting { round: next, current_tool, remaining_tools } = &state {
                        prop_assert!(*next <= max);
                        prop_assert_eq!(*next, round + 1);
                        // Feed plain outputs for the whole batch
                        let mut ids: Vec<String> = std::iter::once(current_tool.id.clone())
                            .chain(remaining_tools.iter().map(|t| t.id.clone()))
                            .collect();
                        ids.reverse();
                        while let Some(id) = ids.pop() {
                            let result = transition(&state, &ctx, Event::ToolComplete {
                                tool_call_id: id,
                                outcome: ToolOutcome::Output("1.0".to_string()),
                            }).unwrap();
                            state = result.new_state;
                        }
                        prop_assert_eq!(&state, &ConvState::AwaitingOracle { round: round + 1 });
                    }
                }
                Err(TransitionError::ToolLoopExceeded { limit }) => {
                    prop_assert_eq!(limit, max);
                    prop_assert_eq!(round, max);
                    break;
                }
                Err(e) => prop_assert!(false, "Unexpected error: {e}"),
            }
        }
    }

    // A staged action always suspends with the token as the tool result
    #[test]
    fn prop_staged_action_suspends(
        action in arb_pending_action(),
        current in arb_tool_call(),
        remaining in proptest::collection::vec(arb_tool_call(), 0..3),
        transcript_len in 2usize..40
    ) {
        let remaining_count = remaining.len();
        let state = ConvState::ToolExecuting {
            round: 1,
            current_tool: current.clone(),
            remaining_tools: remaining,
        };
        let ctx = test_context().with_transcript_len(transcript_len);
        let result = transition(&state, &ctx, Event::ToolComplete {
            tool_call_id: current.id.clone(),
            outcome: ToolOutcome::Staged(action.clone()),
        }).unwrap();

        prop_assert_eq!(
            &result.new_state,
            &ConvState::AwaitingDecision {
                pending_action: action.clone(),
                resume_point: ResumePoint::approval(&current.id, transcript_len),
            }
        );
        prop_assert_eq!(
            &result.effects[0],
            &Effect::append_tool_result(&current.id, action.to_token())
        );
        // token result + one synthetic result per skipped call + persist
        prop_assert_eq!(result.effects.len(), remaining_count + 2);
        prop_assert!(
            !result.effects.iter().any(|e| matches!(e, Effect::DispatchTool { .. })),
            "suspension must not dispatch further tools"
        );
    }

    // The pending action survives a checkpoint round trip unchanged
    #[test]
    fn prop_suspended_state_serde_stable(state in arb_busy_state()) {
        let json = serde_json::to_string(&state).unwrap();
        let back: ConvState = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back.pending_action(), state.pending_action());
        prop_assert_eq!(back.status(), state.status());
    }

    // Idle and Completed always start a turn from a user message
    #[test]
    fn prop_ready_accepts_messages(
        state in prop_oneof![Just(ConvState::Idle), Just(ConvState::Completed)],
        text in "[a-zA-Z ]{1,30}"
    ) {
        let result = transition(&state, &test_context(), Event::UserMessage { text: text.clone() }).unwrap();
        prop_assert_eq!(result.new_state, ConvState::AwaitingOracle { round: 0 });
        prop_assert_eq!(&result.effects[0], &Effect::append_user(text));
    }
}
