//! Conversation store state

use super::{Message, MessageId};

/// Where a retried answer lands in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSlot {
    /// Overwrite the assistant message at this index, keeping its id
    Replace { index: usize },
    /// Insert a new assistant message at this index
    Insert {
        index: usize,
        /// Id of the answer being regenerated, if it was truncated away
        reuse_id: Option<MessageId>,
    },
}

/// The request a store is waiting on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Create,
    Load { conversation_id: String },
    Send,
    Retry { target: MessageId, slot: AnswerSlot },
    Edit { message_id: MessageId },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Load { .. } => "load",
            Operation::Send => "send",
            Operation::Retry { .. } => "retry",
            Operation::Edit { .. } => "edit",
        }
    }
}

/// An outstanding request and how to undo its optimistic changes
#[derive(Debug, Clone, PartialEq)]
pub struct InFlight {
    pub generation: u64,
    pub operation: Operation,
    /// Log as it was before the optimistic update
    pub rollback: Option<Vec<Message>>,
}

/// Single source of truth for the active conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub conversation_id: Option<String>,
    pub is_loading: bool,
    /// Human-readable description of the last failure
    pub error: Option<String>,
    /// Message awaiting a retry/edit answer
    pub pending_message_id: Option<MessageId>,
    pub(crate) generation: u64,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) next_message_id: u64,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current request generation; bumped whenever a request starts
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> Option<&InFlight> {
        self.in_flight.as_ref()
    }

    pub fn position(&self, id: MessageId) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    pub(crate) fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    /// Start a request; returns its generation
    pub(crate) fn begin(&mut self, operation: Operation, rollback: Option<Vec<Message>>) -> u64 {
        self.generation += 1;
        self.in_flight = Some(InFlight {
            generation: self.generation,
            operation,
            rollback,
        });
        self.is_loading = true;
        self.error = None;
        self.generation
    }

    /// Clear request bookkeeping once a request resolves
    pub(crate) fn finish(&mut self) {
        self.in_flight = None;
        self.is_loading = false;
        self.pending_message_id = None;
    }

    /// Drop the outstanding request, undoing its optimistic changes
    ///
    /// Its response will be discarded when it arrives.
    pub(crate) fn abandon_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            if let Some(rollback) = in_flight.rollback {
                self.messages = rollback;
            }
            self.generation += 1;
        }
        self.is_loading = false;
        self.pending_message_id = None;
    }
}
