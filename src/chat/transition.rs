//! Pure state transition function
//!
//! Given the same state, event and clock reading, `transition` always
//! produces the same result and performs no I/O. The session executes the
//! returned effects and feeds their outcomes back in as events.

use super::state::{AnswerSlot, Operation};
use super::{ChatError, ChatState, Effect, Event, Message, MessageId};
use crate::api::{ContinueRequest, ContinueResponse, HistoryPage, Role, Settings};
use chrono::{DateTime, Utc};

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ChatState,
    pub effects: Vec<Effect>,
    /// Failure to hand back to whoever issued the request
    pub failure: Option<ChatError>,
}

impl TransitionResult {
    pub fn new(state: ChatState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
            failure: None,
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_failure(mut self, failure: ChatError) -> Self {
        self.failure = Some(failure);
        self
    }
}

/// Pure transition function
///
/// An `Err` means the event was rejected and `state` stays as it was.
pub fn transition(
    state: &ChatState,
    event: Event,
    now: DateTime<Utc>,
) -> Result<TransitionResult, ChatError> {
    match event {
        // ============================================================
        // Conversation lifecycle
        // ============================================================
        Event::CreateConversation
        | Event::LoadConversation {
            conversation_id: None,
            ..
        } => Ok(start_create(state)),

        Event::LoadConversation {
            conversation_id: Some(conversation_id),
            page,
        } => Ok(start_load(state, conversation_id, page)),

        Event::ConversationDeleted { conversation_id } => {
            let mut next = state.clone();
            if next.conversation_id.as_deref() == Some(conversation_id.as_str()) {
                next.abandon_in_flight();
                next.messages.clear();
                next.conversation_id = None;
            }
            Ok(TransitionResult::new(next))
        }

        Event::SetMessages { messages } => {
            ensure_idle(state)?;
            let mut next = state.clone();
            // Incoming ids are re-keyed from the store counter, like a load
            let rekeyed: Vec<Message> = messages
                .into_iter()
                .map(|message| Message {
                    id: next.allocate_id(),
                    ..message
                })
                .collect();
            next.messages = rekeyed;
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Message operations
        // ============================================================
        Event::SendMessage { content, settings } => start_send(state, content, &settings, now),

        Event::RetryMessage {
            message_id,
            content,
            preserve_history,
            settings,
        } => start_retry(state, message_id, content, preserve_history, &settings),

        Event::EditMessage {
            message_id,
            new_content,
            preserve_history,
            settings,
        } => start_edit(state, message_id, new_content, preserve_history, &settings, now),

        // ============================================================
        // Completions
        // ============================================================
        Event::ConversationCreated {
            generation,
            conversation_id,
        } => {
            let (mut next, operation) = settle(state, generation)?;
            match operation {
                Operation::Create => {
                    next.conversation_id = Some(conversation_id);
                    next.messages.clear();
                    Ok(TransitionResult::new(next))
                }
                other => Err(unexpected("conversation created", &other)),
            }
        }

        Event::ConversationLoaded {
            generation,
            conversation_id,
            messages,
        } => {
            let (mut next, operation) = settle(state, generation)?;
            match operation {
                Operation::Load { .. } => {
                    let mut loaded = Vec::with_capacity(messages.len());
                    for wire in messages {
                        let id = next.allocate_id();
                        loaded.push(Message::from_wire(id, wire));
                    }
                    next.messages = loaded;
                    next.conversation_id = Some(conversation_id);
                    Ok(TransitionResult::new(next))
                }
                other => Err(unexpected("conversation loaded", &other)),
            }
        }

        Event::AnswerReceived {
            generation,
            response,
        } => {
            let (mut next, operation) = settle(state, generation)?;
            match operation {
                Operation::Send | Operation::Edit { .. } => {
                    let id = next.allocate_id();
                    next.messages.push(Message::assistant(id, &response, now));
                }
                Operation::Retry { slot, .. } => place_answer(&mut next, slot, &response, now),
                other => return Err(unexpected("answer received", &other)),
            }
            Ok(TransitionResult::new(next))
        }

        Event::RequestFailed { generation, error } => {
            let in_flight = match state.in_flight() {
                Some(in_flight) if in_flight.generation == generation => in_flight.clone(),
                _ => return Err(ChatError::Superseded),
            };
            let mut next = state.clone();
            next.finish();
            let failure = match in_flight.operation {
                Operation::Create => ChatError::ConversationCreate(error),
                Operation::Load { .. } => ChatError::ConversationLoad(error),
                Operation::Send | Operation::Retry { .. } | Operation::Edit { .. } => {
                    if let Some(rollback) = in_flight.rollback {
                        next.messages = rollback;
                    }
                    ChatError::Api(error)
                }
            };
            next.error = Some(failure.to_string());
            Ok(TransitionResult::new(next).with_failure(failure))
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn ensure_idle(state: &ChatState) -> Result<(), ChatError> {
    if state.in_flight().is_some() {
        return Err(ChatError::Busy);
    }
    Ok(())
}

fn active_conversation(state: &ChatState) -> Result<String, ChatError> {
    state
        .conversation_id
        .clone()
        .ok_or(ChatError::NoActiveConversation)
}

fn unexpected(what: &str, operation: &Operation) -> ChatError {
    ChatError::InvalidTransition(format!("{what} while {} in flight", operation.name()))
}

/// Resolve the in-flight request if `generation` still owns it
fn settle(state: &ChatState, generation: u64) -> Result<(ChatState, Operation), ChatError> {
    match state.in_flight() {
        Some(in_flight) if in_flight.generation == generation => {
            let operation = in_flight.operation.clone();
            let mut next = state.clone();
            next.finish();
            Ok((next, operation))
        }
        _ => Err(ChatError::Superseded),
    }
}

fn continue_effect(
    generation: u64,
    conversation_id: String,
    question: String,
    settings: &Settings,
) -> Effect {
    Effect::ContinueConversation {
        generation,
        conversation_id,
        request: ContinueRequest::new(question, settings),
    }
}

fn start_create(state: &ChatState) -> TransitionResult {
    let mut next = state.clone();
    next.abandon_in_flight();
    let generation = next.begin(Operation::Create, None);
    TransitionResult::new(next).with_effect(Effect::CreateConversation { generation })
}

fn start_load(state: &ChatState, conversation_id: String, page: HistoryPage) -> TransitionResult {
    let mut next = state.clone();
    next.abandon_in_flight();
    let generation = next.begin(
        Operation::Load {
            conversation_id: conversation_id.clone(),
        },
        None,
    );
    TransitionResult::new(next).with_effect(Effect::FetchConversation {
        generation,
        conversation_id,
        page,
    })
}

fn start_send(
    state: &ChatState,
    content: String,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<TransitionResult, ChatError> {
    let conversation_id = active_conversation(state)?;
    ensure_idle(state)?;
    if content.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let mut next = state.clone();
    let rollback = next.messages.clone();
    let id = next.allocate_id();
    next.messages.push(Message::user(id, content.clone(), now));
    let generation = next.begin(Operation::Send, Some(rollback));

    Ok(TransitionResult::new(next).with_effect(continue_effect(
        generation,
        conversation_id,
        content,
        settings,
    )))
}

fn start_retry(
    state: &ChatState,
    message_id: MessageId,
    content: Option<String>,
    preserve_history: bool,
    settings: &Settings,
) -> Result<TransitionResult, ChatError> {
    let conversation_id = active_conversation(state)?;
    ensure_idle(state)?;
    let index = state
        .position(message_id)
        .ok_or(ChatError::MessageNotFound(message_id))?;
    let target = &state.messages[index];

    let mut next = state.clone();
    let (question, slot) = match target.role {
        Role::User => {
            let question = content
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| target.content.clone());
            let answer = state.messages.get(index + 1).filter(|m| m.is_assistant());
            let slot = if preserve_history {
                match answer {
                    Some(_) => AnswerSlot::Replace { index: index + 1 },
                    None => AnswerSlot::Insert {
                        index: index + 1,
                        reuse_id: None,
                    },
                }
            } else {
                next.messages.truncate(index + 1);
                AnswerSlot::Insert {
                    index: index + 1,
                    reuse_id: answer.map(|m| m.id),
                }
            };
            (question, slot)
        }
        Role::Assistant => {
            let question = index
                .checked_sub(1)
                .and_then(|prev| state.messages.get(prev))
                .filter(|m| m.is_user())
                .map(|m| m.content.clone())
                .ok_or(ChatError::NoQuestionToRetry(message_id))?;
            let slot = if preserve_history {
                AnswerSlot::Replace { index }
            } else {
                next.messages.truncate(index);
                AnswerSlot::Insert {
                    index,
                    reuse_id: Some(message_id),
                }
            };
            (question, slot)
        }
    };

    if question.trim().is_empty() {
        return Err(ChatError::NoQuestionToRetry(message_id));
    }

    let generation = next.begin(
        Operation::Retry {
            target: message_id,
            slot,
        },
        Some(state.messages.clone()),
    );
    next.pending_message_id = Some(message_id);

    Ok(TransitionResult::new(next).with_effect(continue_effect(
        generation,
        conversation_id,
        question,
        settings,
    )))
}

fn start_edit(
    state: &ChatState,
    message_id: MessageId,
    new_content: String,
    preserve_history: bool,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<TransitionResult, ChatError> {
    let conversation_id = active_conversation(state)?;
    ensure_idle(state)?;
    let index = state
        .position(message_id)
        .ok_or(ChatError::MessageNotFound(message_id))?;
    if !state.messages[index].is_user() {
        return Err(ChatError::NotEditable(message_id));
    }
    if new_content.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }

    let mut next = state.clone();
    // Without preserved history the edit takes over the original's id, so
    // repeating the same edit addresses the same message.
    let edited_id = if preserve_history {
        next.messages.truncate(index + 1);
        next.allocate_id()
    } else {
        next.messages.truncate(index);
        message_id
    };
    next.messages
        .push(Message::user(edited_id, new_content.clone(), now));

    let generation = next.begin(
        Operation::Edit {
            message_id: edited_id,
        },
        Some(state.messages.clone()),
    );
    next.pending_message_id = Some(edited_id);

    Ok(TransitionResult::new(next).with_effect(continue_effect(
        generation,
        conversation_id,
        new_content,
        settings,
    )))
}

fn place_answer(
    next: &mut ChatState,
    slot: AnswerSlot,
    response: &ContinueResponse,
    now: DateTime<Utc>,
) {
    match slot {
        AnswerSlot::Replace { index } => {
            if let Some(message) = next.messages.get_mut(index) {
                message.replace_answer(response, now);
            } else {
                let id = next.allocate_id();
                next.messages.push(Message::assistant(id, response, now));
            }
        }
        AnswerSlot::Insert { index, reuse_id } => {
            let id = reuse_id.unwrap_or_else(|| next.allocate_id());
            let index = index.min(next.messages.len());
            next.messages
                .insert(index, Message::assistant(id, response, now));
        }
    }
}
