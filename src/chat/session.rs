//! Conversation store runtime
//!
//! Owns the [`ChatState`], runs events through [`transition`], and executes
//! the resulting effects against a [`Transport`]. The state lock is never
//! held across an await, so operations on one session may interleave; stale
//! completions are discarded by generation.

use super::message::ExportedMessage;
use super::transition::transition;
use super::{ChatError, ChatState, Effect, Event, Message, MessageId};
use crate::api::{HistoryPage, Settings, Transport};
use chrono::Utc;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// The conversation store bound to a transport
pub struct ChatSession<T> {
    transport: T,
    state: Mutex<ChatState>,
    updates: watch::Sender<ChatState>,
    page: HistoryPage,
}

impl<T: Transport> ChatSession<T> {
    pub fn new(transport: T) -> Self {
        let (updates, _) = watch::channel(ChatState::new());
        Self {
            transport,
            state: Mutex::new(ChatState::new()),
            updates,
            page: HistoryPage::default(),
        }
    }

    /// Paging used when loading a conversation's history
    #[must_use]
    pub fn with_history_page(mut self, page: HistoryPage) -> Self {
        self.page = page;
        self
    }

    pub fn snapshot(&self) -> ChatState {
        self.lock().clone()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.updates.subscribe()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.lock().conversation_id.clone()
    }

    /// Start a new conversation and make it active
    pub async fn create_conversation(&self) -> Result<String, ChatError> {
        let state = self.dispatch(Event::CreateConversation).await?;
        state.conversation_id.ok_or(ChatError::NoActiveConversation)
    }

    /// Replace the log with a conversation's history
    ///
    /// Without an id a fresh conversation is created instead.
    pub async fn load_conversation(&self, conversation_id: Option<&str>) -> Result<(), ChatError> {
        self.dispatch(Event::LoadConversation {
            conversation_id: conversation_id.map(str::to_string),
            page: self.page.clone(),
        })
        .await?;
        Ok(())
    }

    pub async fn send_message(&self, content: &str, settings: Settings) -> Result<(), ChatError> {
        self.dispatch(Event::SendMessage {
            content: content.to_string(),
            settings,
        })
        .await?;
        Ok(())
    }

    /// Regenerate the answer for `message_id`
    ///
    /// `content` replaces the question when the target is a user message.
    pub async fn retry_message(
        &self,
        message_id: MessageId,
        content: Option<&str>,
        preserve_history: bool,
        settings: Settings,
    ) -> Result<(), ChatError> {
        self.dispatch(Event::RetryMessage {
            message_id,
            content: content.map(str::to_string),
            preserve_history,
            settings,
        })
        .await?;
        Ok(())
    }

    pub async fn edit_message(
        &self,
        message_id: MessageId,
        new_content: &str,
        preserve_history: bool,
        settings: Settings,
    ) -> Result<(), ChatError> {
        self.dispatch(Event::EditMessage {
            message_id,
            new_content: new_content.to_string(),
            preserve_history,
            settings,
        })
        .await?;
        Ok(())
    }

    pub fn set_messages(&self, messages: Vec<Message>) -> Result<(), ChatError> {
        self.apply(Event::SetMessages { messages })?;
        Ok(())
    }

    /// Forget the active conversation if it was deleted elsewhere
    pub fn conversation_deleted(&self, conversation_id: &str) {
        let event = Event::ConversationDeleted {
            conversation_id: conversation_id.to_string(),
        };
        if let Err(error) = self.apply(event) {
            tracing::warn!(error = %error, "Failed to clear deleted conversation");
        }
    }

    /// The log as `[{role, content, timestamp}]`
    pub fn export(&self) -> Vec<ExportedMessage> {
        self.lock().messages.iter().map(ExportedMessage::from).collect()
    }

    fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one intent to completion, returning the state it settled in
    async fn dispatch(&self, event: Event) -> Result<ChatState, ChatError> {
        let (mut settled, effects) = self.apply(event)?;
        for effect in effects {
            tracing::debug!(generation = effect.generation(), ?effect, "Executing effect");
            let completion = self.execute_effect(effect).await;
            settled = self.apply(completion)?.0;
        }
        Ok(settled)
    }

    /// Apply one event under the lock and publish the new state
    fn apply(&self, event: Event) -> Result<(ChatState, Vec<Effect>), ChatError> {
        let mut state = self.lock();
        let result = match transition(&state, event, Utc::now()) {
            Ok(result) => result,
            Err(error) => {
                if error.is_reportable() {
                    state.error = Some(error.to_string());
                    self.updates.send_replace(state.clone());
                } else {
                    tracing::debug!(error = %error, "Event ignored");
                }
                return Err(error);
            }
        };

        *state = result.new_state;
        self.updates.send_replace(state.clone());

        if let Some(failure) = result.failure {
            tracing::warn!(error = %failure, "Conversation request failed");
            return Err(failure);
        }
        Ok((state.clone(), result.effects))
    }

    async fn execute_effect(&self, effect: Effect) -> Event {
        match effect {
            Effect::CreateConversation { generation } => {
                match self.transport.create_conversation().await {
                    Ok(created) => {
                        tracing::info!(conv_id = %created.conversation_id, "Conversation created");
                        Event::ConversationCreated {
                            generation,
                            conversation_id: created.conversation_id,
                        }
                    }
                    Err(error) => Event::RequestFailed { generation, error },
                }
            }
            Effect::FetchConversation {
                generation,
                conversation_id,
                page,
            } => match self.transport.conversation_detail(&conversation_id, &page).await {
                Ok(detail) => {
                    tracing::info!(
                        conv_id = %conversation_id,
                        messages = detail.messages.len(),
                        "Conversation loaded"
                    );
                    Event::ConversationLoaded {
                        generation,
                        conversation_id,
                        messages: detail.messages,
                    }
                }
                Err(error) => Event::RequestFailed { generation, error },
            },
            Effect::ContinueConversation {
                generation,
                conversation_id,
                request,
            } => match self
                .transport
                .continue_conversation(&conversation_id, &request)
                .await
            {
                Ok(response) => Event::AnswerReceived {
                    generation,
                    response,
                },
                Err(error) => Event::RequestFailed { generation, error },
            },
        }
    }
}
