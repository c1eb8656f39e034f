//! Core conversation state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.
//! The runtime feeds events in and executes the effects that come out;
//! nothing in here performs I/O.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::{Event, ToolOutcome};
pub use state::{
    ConvContext, ConvState, Decision, InvalidDecision, Message, PendingAction, ResumePoint, Role,
    Status, ToolCall, Transcript,
};
pub use transition::{transition, TransitionError};
