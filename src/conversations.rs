//! Conversation index
//!
//! The list of the user's conversations plus rename and delete. Kept apart
//! from the active-conversation store: deleting here only tells the chat
//! session to forget the conversation if it happens to be active.

use crate::api::{ApiError, ConversationDetail, ConversationSummary, ConversationUpdate, HistoryPage, Transport};
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

const TITLE_PREVIEW_CHARS: usize = 40;
const LIST_PREVIEW_CHARS: usize = 50;

/// Snapshot of the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexState {
    pub conversations: Vec<ConversationSummary>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Column a conversation list can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    LastInteraction,
    TotalMessages,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

pub struct ConversationIndex<T> {
    transport: T,
    state: Mutex<IndexState>,
}

impl<T: Transport> ConversationIndex<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: Mutex::new(IndexState::default()),
        }
    }

    pub fn snapshot(&self) -> IndexState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, IndexState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self) {
        let mut state = self.lock();
        state.is_loading = true;
        state.error = None;
    }

    fn fail(&self, message: &str, error: &ApiError) {
        tracing::warn!(error = %error, "{message}");
        let mut state = self.lock();
        state.is_loading = false;
        state.error = Some(message.to_string());
    }

    pub async fn refresh(&self) -> Result<Vec<ConversationSummary>, ApiError> {
        self.start();
        match self.transport.list_conversations().await {
            Ok(conversations) => {
                let mut state = self.lock();
                state.conversations.clone_from(&conversations);
                state.is_loading = false;
                Ok(conversations)
            }
            Err(error) => {
                self.fail("Failed to load conversations", &error);
                Err(error)
            }
        }
    }

    /// Fetch one conversation without touching the list
    pub async fn detail(
        &self,
        conversation_id: &str,
        page: &HistoryPage,
    ) -> Result<ConversationDetail, ApiError> {
        self.transport.conversation_detail(conversation_id, page).await
    }

    /// Update title and metadata, then re-read the conversation
    pub async fn rename(
        &self,
        conversation_id: &str,
        title: &str,
        metadata: Option<Value>,
    ) -> Result<ConversationDetail, ApiError> {
        self.start();
        let update = ConversationUpdate {
            title: Some(title.to_string()),
            metadata,
        };
        let result = match self
            .transport
            .update_conversation(conversation_id, &update)
            .await
        {
            Ok(()) => {
                self.transport
                    .conversation_detail(conversation_id, &HistoryPage::default())
                    .await
            }
            Err(error) => Err(error),
        };

        match result {
            Ok(detail) => {
                let mut state = self.lock();
                if let Some(entry) = state
                    .conversations
                    .iter_mut()
                    .find(|c| c.conversation_id == conversation_id)
                {
                    *entry = detail.summary.clone();
                }
                state.is_loading = false;
                Ok(detail)
            }
            Err(error) => {
                self.fail("Failed to update conversation", &error);
                Err(error)
            }
        }
    }

    /// Delete a conversation and reload the list
    pub async fn remove(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.start();
        if let Err(error) = self.transport.delete_conversation(conversation_id).await {
            self.fail("Failed to delete conversation", &error);
            return Err(error);
        }
        tracing::info!(conv_id = %conversation_id, "Conversation deleted");
        self.refresh().await?;
        Ok(())
    }

    /// The current list in display order
    pub fn sorted(&self, key: SortKey, order: SortOrder) -> Vec<ConversationSummary> {
        let mut conversations = self.lock().conversations.clone();
        sort_conversations(&mut conversations, key, order);
        conversations
    }
}

pub fn sort_conversations(conversations: &mut [ConversationSummary], key: SortKey, order: SortOrder) {
    conversations.sort_by(|a, b| {
        let ordering = compare(a, b, key);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn compare(a: &ConversationSummary, b: &ConversationSummary, key: SortKey) -> Ordering {
    match key {
        // ISO-8601 strings order chronologically
        SortKey::LastInteraction => a.last_interaction.cmp(&b.last_interaction),
        SortKey::TotalMessages => a.total_messages.cmp(&b.total_messages),
        SortKey::Title => display_title(a).cmp(&display_title(b)),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", text.get(..cut).unwrap_or(text)),
        None => text.to_string(),
    }
}

/// Header title: explicit title, else the first question, else "New Chat"
pub fn display_title(summary: &ConversationSummary) -> String {
    if let Some(title) = summary.title.as_deref().filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    match summary.questions_asked.first().filter(|q| !q.is_empty()) {
        Some(question) => truncate_chars(question, TITLE_PREVIEW_CHARS),
        None => "New Chat".to_string(),
    }
}

/// First question as shown in the conversation list
pub fn question_preview(summary: &ConversationSummary) -> String {
    match summary.questions_asked.first() {
        Some(question) => truncate_chars(question, LIST_PREVIEW_CHARS),
        None => "New Conversation".to_string(),
    }
}

/// Abbreviated id: first four and last four characters
pub fn short_id(conversation_id: &str) -> String {
    if conversation_id.is_empty() {
        return String::new();
    }
    let first: String = conversation_id.chars().take(4).collect();
    let count = conversation_id.chars().count();
    let last: String = conversation_id.chars().skip(count.saturating_sub(4)).collect();
    format!("{first}-{last}")
}
