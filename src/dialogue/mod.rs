//! Conversation flow for assembling a weekly report.
//!
//! A [`DialogueEngine`] owns one handler per [`StateId`] and drives each
//! user's session through them, one update at a time.

pub mod command;
pub mod engine;
pub mod states;
pub mod traits;

pub use command::{Command, Input, Keyword};
pub use engine::DialogueEngine;
pub use states::{default_states, state_for_step};
pub use traits::{DialogueError, DialogueResult, Outcome, Services, State, StateId, Turn};
