//! Effects produced by state transitions

use crate::api::{ContinueRequest, HistoryPage};

/// Transport calls to make after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CreateConversation {
        generation: u64,
    },
    FetchConversation {
        generation: u64,
        conversation_id: String,
        page: HistoryPage,
    },
    ContinueConversation {
        generation: u64,
        conversation_id: String,
        request: ContinueRequest,
    },
}

impl Effect {
    pub fn generation(&self) -> u64 {
        match self {
            Effect::CreateConversation { generation }
            | Effect::FetchConversation { generation, .. }
            | Effect::ContinueConversation { generation, .. } => *generation,
        }
    }
}
