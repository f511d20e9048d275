//! The orchestration loop: the heart of Ichika.
//!
//! Each user message runs a bounded **Reason → Act → Observe** cycle:
//!
//! 1. **Receive** a normalized message and lock its session
//! 2. **Reason**: send persona, history and tool catalog to the model
//! 3. **Act**: if the model requests tools, run them and record observations
//! 4. **Observe**: loop back to step 2 with the new observations
//! 5. **Respond** with the model's final text
//!
//! The loop ends when the model answers without tool calls, when the tool
//! budget for the message is spent, or when anything fails. Every path
//! leaves a user-facing answer in the session.

pub mod orchestrator;
pub mod outcome;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use orchestrator::Orchestrator;
pub use outcome::{FailureKind, OutcomeKind, TurnOutcome, APOLOGY_MESSAGE, ITERATION_LIMIT_MESSAGE};
