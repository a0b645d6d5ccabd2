//! API request and response types

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Chat settings
// ============================================================================

/// Prompt strategy the backend uses to answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    Standard,
    Academic,
    Concise,
    Creative,
    StepByStep,
}

/// Shape of the generated answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseFormat {
    Default,
    Json,
    #[default]
    Markdown,
    BulletPoints,
}

/// Whether answers must stay within the uploaded documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    Strict,
    #[default]
    Flexible,
}

macro_rules! wire_names {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| {
                        let names: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                        format!("unknown value '{s}', expected one of: {}", names.join(", "))
                    })
            }
        }
    };
}

wire_names!(Strategy {
    Standard => "standard",
    Academic => "academic",
    Concise => "concise",
    Creative => "creative",
    StepByStep => "step-by-step",
});

wire_names!(ResponseFormat {
    Default => "default",
    Json => "json",
    Markdown => "markdown",
    BulletPoints => "bullet-points",
});

wire_names!(ContextMode {
    Strict => "strict",
    Flexible => "flexible",
});

/// Per-request answer settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default)]
    pub context_mode: ContextMode,
}

// ============================================================================
// Messages
// ============================================================================

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Generation details attached to an assistant answer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A document passage the answer was grounded on
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub relevance: Option<f64>,
    #[serde(default)]
    pub document_id: Option<String>,
}

/// A message as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
}

// ============================================================================
// Conversations
// ============================================================================

/// Response to `POST /conversation/create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversation {
    pub conversation_id: String,
}

/// Conversation as listed by `GET /conversations`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub questions_asked: Vec<String>,
    #[serde(default)]
    pub total_messages: u64,
    #[serde(default)]
    pub last_interaction: Option<String>,
}

/// Response to `GET /conversation/{id}/detail`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub summary: ConversationSummary,
    #[serde(default, deserialize_with = "null_as_default")]
    pub messages: Vec<WireMessage>,
}

/// Pagination for conversation history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub message_limit: u32,
    /// Only return messages older than this timestamp
    pub before_timestamp: Option<String>,
}

/// Default number of messages fetched per history page
pub const DEFAULT_MESSAGE_LIMIT: u32 = 50;

impl Default for HistoryPage {
    fn default() -> Self {
        Self {
            message_limit: DEFAULT_MESSAGE_LIMIT,
            before_timestamp: None,
        }
    }
}

/// Body of `PATCH /conversation/{id}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Body of `POST /conversation/{id}/continue`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueRequest {
    pub question: String,
    pub strategy: Strategy,
    pub response_format: ResponseFormat,
    pub context_mode: ContextMode,
}

impl ContinueRequest {
    pub fn new(question: impl Into<String>, settings: &Settings) -> Self {
        Self {
            question: question.into(),
            strategy: settings.strategy,
            response_format: settings.response_format,
            context_mode: settings.context_mode,
        }
    }
}

/// Answer returned by the continue endpoint
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContinueResponse {
    pub response: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub metadata: Option<MessageMetadata>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Accept either a bare array or `{"conversations": [...]}`
pub fn conversations_from_value(value: Value) -> Result<Vec<ConversationSummary>, serde_json::Error> {
    match value {
        Value::Array(_) => serde_json::from_value(value),
        Value::Object(mut map) => match map.remove("conversations") {
            Some(list) => serde_json::from_value(list),
            None => Ok(Vec::new()),
        },
        _ => Ok(Vec::new()),
    }
}

// ============================================================================
// Documents
// ============================================================================

/// An uploaded document; fields beyond the common ones are kept verbatim
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, alias = "document_id")]
    pub id: Option<String>,
    #[serde(default, alias = "name")]
    pub filename: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A file to send to `POST /document/upload`
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub metadata: Option<Value>,
}

/// Accept a bare array, `{"documents": [...]}`, or an object keyed by id
pub fn documents_from_value(value: Value) -> Result<Vec<Document>, serde_json::Error> {
    match value {
        Value::Array(_) => serde_json::from_value(value),
        Value::Object(mut map) => {
            if let Some(list @ Value::Array(_)) = map.remove("documents") {
                return serde_json::from_value(list);
            }
            map.into_iter()
                .map(|(key, entry)| {
                    let mut doc: Document = serde_json::from_value(entry)?;
                    doc.id.get_or_insert(key);
                    Ok(doc)
                })
                .collect()
        }
        _ => Ok(Vec::new()),
    }
}
