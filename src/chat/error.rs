//! Errors surfaced by conversation operations

use super::MessageId;
use crate::api::ApiError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("No active conversation")]
    NoActiveConversation,
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),
    #[error("No question found to retry for message {0}")]
    NoQuestionToRetry(MessageId),
    #[error("Only user messages can be edited (message {0})")]
    NotEditable(MessageId),
    #[error("Failed to create new conversation: {0}")]
    ConversationCreate(ApiError),
    #[error("Failed to load conversation: {0}")]
    ConversationLoad(ApiError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Another request is already in flight")]
    Busy,
    #[error("Request was superseded by a conversation change")]
    Superseded,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl ChatError {
    /// Whether this error belongs in the store's error banner
    ///
    /// Busy and superseded requests are flow control, not failures.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, ChatError::Busy | ChatError::Superseded)
    }
}
