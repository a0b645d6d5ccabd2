//! Property-based tests for the conversation store
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::Operation;
use super::transition::{transition, TransitionResult};
use super::*;
use crate::api::{ApiError, ContinueResponse, HistoryPage, Role, Settings, WireMessage};
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Test Helpers
// ============================================================================

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn state_with(log: &[(Role, String)]) -> ChatState {
    let mut state = ChatState::new();
    state.conversation_id = Some("c1".to_string());
    for (role, content) in log {
        let id = state.allocate_id();
        let mut message = Message::user(id, content.clone(), now());
        message.role = *role;
        state.messages.push(message);
    }
    state
}

fn answer(text: &str) -> ContinueResponse {
    ContinueResponse {
        response: text.to_string(),
        ..ContinueResponse::default()
    }
}

fn roles_and_content(state: &ChatState) -> Vec<(Role, String)> {
    state
        .messages
        .iter()
        .map(|m| (m.role, m.content.clone()))
        .collect()
}

fn ids_are_unique(state: &ChatState) -> bool {
    let mut seen = HashSet::new();
    state.messages.iter().all(|m| seen.insert(m.id))
}

/// Feed the completion for whatever is in flight
fn complete(state: &ChatState, outcome: &Outcome) -> Option<TransitionResult> {
    let in_flight = state.in_flight()?;
    let generation = in_flight.generation;
    let event = match (outcome, &in_flight.operation) {
        (Outcome::Fail, _) => Event::RequestFailed {
            generation,
            error: ApiError::network("down"),
        },
        (Outcome::Succeed(_), Operation::Create) => Event::ConversationCreated {
            generation,
            conversation_id: "fresh".to_string(),
        },
        (Outcome::Succeed(text), Operation::Load { conversation_id }) => Event::ConversationLoaded {
            generation,
            conversation_id: conversation_id.clone(),
            messages: vec![WireMessage {
                role: Role::User,
                content: text.clone(),
                timestamp: None,
                metadata: None,
                sources: vec![],
            }],
        },
        (Outcome::Succeed(text), _) => Event::AnswerReceived {
            generation,
            response: answer(text),
        },
    };
    transition(state, event, now()).ok()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::User), Just(Role::Assistant)]
}

fn arb_text() -> impl Strategy<Value = String> {
    "[a-z]{1,10}( [a-z]{1,10})?"
}

fn arb_log() -> impl Strategy<Value = Vec<(Role, String)>> {
    proptest::collection::vec((arb_role(), arb_text()), 0..8)
}

/// A log that alternates question/answer pairs
fn arb_exchanges() -> impl Strategy<Value = Vec<(Role, String)>> {
    proptest::collection::vec((arb_text(), arb_text()), 1..5).prop_map(|pairs| {
        pairs
            .into_iter()
            .flat_map(|(q, a)| [(Role::User, q), (Role::Assistant, a)])
            .collect()
    })
}

#[derive(Debug, Clone)]
enum Outcome {
    Succeed(String),
    Fail,
}

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        3 => arb_text().prop_map(Outcome::Succeed),
        1 => Just(Outcome::Fail),
    ]
}

/// Message ids are addressed by position so they hit existing messages
#[derive(Debug, Clone)]
enum Intent {
    Send(String),
    Retry { index: usize, preserve: bool },
    Edit { index: usize, text: String, preserve: bool },
    Create,
    Load,
}

fn arb_intent() -> impl Strategy<Value = Intent> {
    prop_oneof![
        4 => arb_text().prop_map(Intent::Send),
        2 => (0usize..10, any::<bool>()).prop_map(|(index, preserve)| Intent::Retry { index, preserve }),
        2 => (0usize..10, arb_text(), any::<bool>())
            .prop_map(|(index, text, preserve)| Intent::Edit { index, text, preserve }),
        1 => Just(Intent::Create),
        1 => Just(Intent::Load),
    ]
}

fn to_event(state: &ChatState, intent: &Intent) -> Event {
    let id_at = |index: usize| {
        state
            .messages
            .get(index)
            .map_or(MessageId(u64::MAX), |m| m.id)
    };
    match intent {
        Intent::Send(text) => Event::SendMessage {
            content: text.clone(),
            settings: Settings::default(),
        },
        Intent::Retry { index, preserve } => Event::RetryMessage {
            message_id: id_at(*index),
            content: None,
            preserve_history: *preserve,
            settings: Settings::default(),
        },
        Intent::Edit {
            index,
            text,
            preserve,
        } => Event::EditMessage {
            message_id: id_at(*index),
            new_content: text.clone(),
            preserve_history: *preserve,
            settings: Settings::default(),
        },
        Intent::Create => Event::CreateConversation,
        Intent::Load => Event::LoadConversation {
            conversation_id: Some("other".to_string()),
            page: HistoryPage::default(),
        },
    }
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Invariant 1: ids stay unique and loading tracks the in-flight request
    #[test]
    fn prop_operations_keep_log_consistent(
        log in arb_log(),
        steps in proptest::collection::vec((arb_intent(), arb_outcome()), 0..20)
    ) {
        let mut state = state_with(&log);
        for (intent, outcome) in steps {
            let event = to_event(&state, &intent);
            if let Ok(result) = transition(&state, event, now()) {
                state = result.new_state;
                prop_assert_eq!(state.is_loading, state.in_flight().is_some());
                prop_assert!(ids_are_unique(&state), "Duplicate ids: {:?}", state.messages);
            }
            if let Some(result) = complete(&state, &outcome) {
                state = result.new_state;
            }
            prop_assert!(!state.is_loading);
            prop_assert!(state.pending_message_id.is_none());
            prop_assert!(ids_are_unique(&state), "Duplicate ids: {:?}", state.messages);
        }
    }

    // Invariant 2: sending without a conversation never touches the log
    #[test]
    fn prop_send_requires_conversation(log in arb_log(), text in arb_text()) {
        let mut state = state_with(&log);
        state.conversation_id = None;
        let result = transition(
            &state,
            Event::SendMessage { content: text, settings: Settings::default() },
            now(),
        );
        prop_assert_eq!(result.unwrap_err(), ChatError::NoActiveConversation);
    }

    // Invariant 3: a failed request restores the exact pre-request log
    #[test]
    fn prop_failure_restores_log(log in arb_log(), intent in arb_intent()) {
        let state = state_with(&log);
        let event = to_event(&state, &intent);
        if let Ok(started) = transition(&state, event, now()) {
            let failed = complete(&started.new_state, &Outcome::Fail).unwrap();
            prop_assert_eq!(&failed.new_state.messages, &state.messages);
            prop_assert_eq!(&failed.new_state.conversation_id, &state.conversation_id);
            prop_assert!(failed.new_state.error.is_some());
            prop_assert!(failed.failure.is_some());
        }
    }

    // Invariant 4: retry with preserved history never shrinks the log
    #[test]
    fn prop_retry_preserving_never_shrinks(log in arb_log(), index in 0usize..8, text in arb_text()) {
        let state = state_with(&log);
        let event = to_event(&state, &Intent::Retry { index, preserve: true });
        if let Ok(started) = transition(&state, event, now()) {
            prop_assert_eq!(started.new_state.messages.len(), state.messages.len());
            let done = complete(&started.new_state, &Outcome::Succeed(text)).unwrap();
            prop_assert!(done.new_state.messages.len() >= state.messages.len());
            // Everything before the target survives untouched
            prop_assert_eq!(&done.new_state.messages[..index], &state.messages[..index]);
        }
    }

    // Invariant 5: retry without history stages the log up to the target
    #[test]
    fn prop_retry_discarding_stages_prefix(log in arb_log(), index in 0usize..8) {
        let state = state_with(&log);
        let event = to_event(&state, &Intent::Retry { index, preserve: false });
        if let Ok(started) = transition(&state, event, now()) {
            let expected = match state.messages[index].role {
                Role::User => index + 1,
                Role::Assistant => index,
            };
            prop_assert_eq!(started.new_state.messages.len(), expected);
            prop_assert_eq!(
                &started.new_state.messages[..],
                &state.messages[..expected]
            );
        }
    }

    // Invariant 6: repeating the same edit without history is idempotent
    #[test]
    fn prop_edit_discarding_is_idempotent(
        log in arb_exchanges(),
        pair in 0usize..4,
        text in arb_text(),
        reply in arb_text()
    ) {
        let state = state_with(&log);
        let index = (pair * 2).min(log.len() - 2);
        let intent = Intent::Edit { index, text, preserve: false };

        let once = transition(&state, to_event(&state, &intent), now()).unwrap();
        let once = complete(&once.new_state, &Outcome::Succeed(reply.clone())).unwrap().new_state;

        let twice = transition(&once, to_event(&once, &intent), now()).unwrap();
        let twice = complete(&twice.new_state, &Outcome::Succeed(reply)).unwrap().new_state;

        prop_assert_eq!(roles_and_content(&once), roles_and_content(&twice));
        prop_assert_eq!(once.messages[index].id, twice.messages[index].id);
        prop_assert_eq!(once.messages[index].id, state.messages[index].id);
    }

    // Invariant 7: a completion for a superseded request is rejected
    #[test]
    fn prop_switch_discards_late_answer(log in arb_exchanges(), text in arb_text()) {
        let state = state_with(&log);
        let sent = transition(
            &state,
            Event::SendMessage { content: text.clone(), settings: Settings::default() },
            now(),
        )
        .unwrap()
        .new_state;
        let stale = sent.generation();

        let switched = transition(&sent, Event::CreateConversation, now()).unwrap().new_state;
        prop_assert_eq!(&switched.messages, &state.messages);

        let late = transition(
            &switched,
            Event::AnswerReceived { generation: stale, response: answer(&text) },
            now(),
        );
        prop_assert_eq!(late.unwrap_err(), ChatError::Superseded);
    }

    // Invariant 8: busy stores reject every message operation
    #[test]
    fn prop_busy_rejects_message_operations(log in arb_exchanges(), intent in arb_intent()) {
        let state = state_with(&log);
        let busy = transition(
            &state,
            Event::SendMessage { content: "pending".to_string(), settings: Settings::default() },
            now(),
        )
        .unwrap()
        .new_state;

        let event = to_event(&busy, &intent);
        let result = transition(&busy, event, now());
        match intent {
            Intent::Create | Intent::Load => prop_assert!(result.is_ok()),
            _ => prop_assert_eq!(result.unwrap_err(), ChatError::Busy),
        }
    }
}
