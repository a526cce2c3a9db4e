use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::FilePart;

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
    /// Also the landing spot for role strings this client does not know.
    #[default]
    #[serde(other)]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Canonical message content.
///
/// Serialized as `{"kind":"text","text":..}` or `{"kind":"file","file":{..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    File { file: FilePart },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn file(file: FilePart) -> Self {
        Self::File { file }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::File { .. } => None,
        }
    }

    pub fn as_file(&self) -> Option<&FilePart> {
        match self {
            Self::Text { .. } => None,
            Self::File { file } => Some(file),
        }
    }

    /// One-line rendering used by list views.
    pub fn summary(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::File { file } => format!("File: {}", file.mime_type),
        }
    }
}

/// A normalized conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "message_id")]
    pub id: String,
    #[serde(rename = "context_id")]
    pub conversation_id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Message {
    /// Build a user-authored message with a fresh random id.
    pub fn user(conversation_id: impl Into<String>, parts: Vec<Part>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role: Role::User,
            recipient: None,
            parts,
        }
    }

    /// Text parts joined with a space; files are rendered as `File: <mime>`.
    pub fn summary(&self) -> String {
        self.parts
            .iter()
            .map(Part::summary)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A message exactly as the backend sent it, before part normalization.
///
/// Every field decodes leniently: a `null` or mistyped value falls back to
/// the default, so one odd message never fails the list it arrived in.
/// `parts` stays raw; the normalizer decides what a non-array means.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub message_id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub context_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub role: Role,
    #[serde(default, deserialize_with = "lenient")]
    pub recipient: Option<String>,
    #[serde(default)]
    pub parts: Value,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// A catalog entry as returned by `/conversation/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawConversation {
    pub conversation_id: String,
    #[serde(default)]
    pub messages: Option<Vec<RawMessage>>,
}

/// A normalized conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }
}

/// Acknowledgement returned by `/message/send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub message_id: String,
    #[serde(default)]
    pub context_id: String,
}
