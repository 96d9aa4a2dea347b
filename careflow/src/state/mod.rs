//! Conversation state threaded through a pipeline run.
//!
//! This module provides:
//! - Messages and author roles
//! - The per-run [`ConversationState`]
//! - [`PartialState`] stage outputs and the merge contract

mod conversation;
mod message;
mod partial;

pub use conversation::{ConversationState, DEFAULT_FOCUS, SUBJECT_ID_KEY};
pub use message::{Message, Role};
pub use partial::PartialState;
