//! Conversation store
//!
//! The active conversation's message log and the operations on it. State
//! changes go through a pure [`transition`] function; [`ChatSession`] runs
//! the resulting effects against a [`Transport`](crate::api::Transport).

mod effect;
mod error;
mod event;
mod message;
mod session;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use error::ChatError;
pub use event::Event;
pub use message::{export_file_name, ExportedMessage, Message, MessageId};
pub use session::ChatSession;
pub use state::ChatState;
