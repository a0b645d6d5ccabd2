//! Messages in the active conversation log

use crate::api::{ContinueResponse, MessageMetadata, Role, Source, WireMessage};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Locally assigned message identity
///
/// Allocated from a per-store counter, so ids are monotonic within one
/// store and never reused. Loaded and imported messages are re-keyed
/// from the same counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// RFC 3339 timestamp with millisecond precision
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
}

impl Message {
    pub fn user(id: MessageId, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            timestamp: timestamp(now),
            metadata: None,
            sources: Vec::new(),
        }
    }

    pub fn assistant(id: MessageId, response: &ContinueResponse, now: DateTime<Utc>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: response.response.clone(),
            timestamp: timestamp(now),
            metadata: response.metadata.clone(),
            sources: response.sources.clone(),
        }
    }

    /// Overwrite this message's answer in place, keeping its id
    pub fn replace_answer(&mut self, response: &ContinueResponse, now: DateTime<Utc>) {
        self.content.clone_from(&response.response);
        self.timestamp = timestamp(now);
        self.metadata.clone_from(&response.metadata);
        self.sources.clone_from(&response.sources);
    }

    pub fn from_wire(id: MessageId, wire: WireMessage) -> Self {
        Self {
            id,
            role: wire.role,
            content: wire.content,
            timestamp: wire.timestamp.unwrap_or_default(),
            metadata: wire.metadata,
            sources: wire.sources,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// One entry of an exported chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl From<&Message> for ExportedMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            timestamp: message.timestamp.clone(),
        }
    }
}

/// File name used when saving an export
pub fn export_file_name(conversation_id: &str) -> String {
    format!("chat-history-{conversation_id}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn timestamps_are_rfc3339_millis() {
        assert_eq!(timestamp(at_noon()), "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn replace_answer_keeps_identity() {
        let first = ContinueResponse {
            response: "old".into(),
            sources: vec![Source::default()],
            ..ContinueResponse::default()
        };
        let mut msg = Message::assistant(MessageId(7), &first, at_noon());
        assert_eq!(msg.sources.len(), 1);

        let second = ContinueResponse {
            response: "new".into(),
            ..ContinueResponse::default()
        };
        msg.replace_answer(&second, at_noon() + chrono::Duration::seconds(5));
        assert_eq!(msg.id, MessageId(7));
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "new");
        assert!(msg.sources.is_empty());
        assert_eq!(msg.timestamp, "2024-05-01T12:00:05.000Z");
    }

    #[test]
    fn export_shape_is_role_content_timestamp() {
        let msg = Message::user(MessageId(1), "hello", at_noon());
        let value = serde_json::to_value(ExportedMessage::from(&msg)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "role": "user",
                "content": "hello",
                "timestamp": "2024-05-01T12:00:00.000Z"
            })
        );
        assert_eq!(export_file_name("abc"), "chat-history-abc.json");
    }
}
