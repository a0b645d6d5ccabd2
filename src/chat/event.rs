//! Events that drive the conversation store

use super::{Message, MessageId};
use crate::api::{ApiError, ContinueResponse, HistoryPage, Settings, WireMessage};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User intents
    CreateConversation,
    LoadConversation {
        /// `None` starts a fresh conversation instead
        conversation_id: Option<String>,
        page: HistoryPage,
    },
    SendMessage {
        content: String,
        settings: Settings,
    },
    RetryMessage {
        message_id: MessageId,
        /// Replacement question when the target is a user message
        content: Option<String>,
        preserve_history: bool,
        settings: Settings,
    },
    EditMessage {
        message_id: MessageId,
        new_content: String,
        preserve_history: bool,
        settings: Settings,
    },
    SetMessages {
        messages: Vec<Message>,
    },
    ConversationDeleted {
        conversation_id: String,
    },

    // Transport completions, tagged with the generation that issued them
    ConversationCreated {
        generation: u64,
        conversation_id: String,
    },
    ConversationLoaded {
        generation: u64,
        conversation_id: String,
        messages: Vec<WireMessage>,
    },
    AnswerReceived {
        generation: u64,
        response: ContinueResponse,
    },
    RequestFailed {
        generation: u64,
        error: ApiError,
    },
}
