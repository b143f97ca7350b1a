//! Domain types shared by the chat relay, storage, and HTTP layers.
//!
//! Stage and language arrive from the browser as loose JSON values; both are
//! closed enums here and deserialize permissively so that malformed client
//! input falls through to a defined default instead of failing the request.

use std::fmt;
use std::str::FromStr;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

// =============================================================================
// Conversation
// =============================================================================

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of `POST /chat`.
///
/// Every field is optional. Messages with an unknown role or without string
/// content are dropped rather than rejecting the whole request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    #[serde(deserialize_with = "lenient_messages")]
    pub messages: Vec<ChatMessage>,
    #[serde(rename = "userId", alias = "user_id")]
    pub user_id: Option<String>,
    pub stage: Stage,
    pub lang: Lang,
}

impl ChatRequest {
    /// Client-supplied user id, ignoring empty or whitespace-only values.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Number of user-role messages in the payload.
    pub fn user_message_count(&self) -> usize {
        self.messages.iter().filter(|m| m.role == Role::User).count()
    }

    /// Content of the newest user-role message, if any.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

fn lenient_messages<'de, D>(deserializer: D) -> Result<Vec<ChatMessage>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value::<ChatMessage>(v).ok())
        .collect())
}

// =============================================================================
// Stage
// =============================================================================

/// Self-declared academic or life phase of the person chatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Stage {
    #[default]
    Unknown,
    Foundation,
    Development,
    Strategic,
    Undergraduate,
    Masters,
    Doctoral,
    Parent,
}

impl Stage {
    /// The seven declared stages in menu order.
    pub const DECLARED: [Stage; 7] = [
        Stage::Foundation,
        Stage::Development,
        Stage::Strategic,
        Stage::Undergraduate,
        Stage::Masters,
        Stage::Doctoral,
        Stage::Parent,
    ];

    pub fn from_number(n: u64) -> Self {
        match n {
            1 => Stage::Foundation,
            2 => Stage::Development,
            3 => Stage::Strategic,
            4 => Stage::Undergraduate,
            5 => Stage::Masters,
            6 => Stage::Doctoral,
            7 => Stage::Parent,
            _ => Stage::Unknown,
        }
    }

    pub fn number(&self) -> Option<u8> {
        match self {
            Stage::Unknown => None,
            Stage::Foundation => Some(1),
            Stage::Development => Some(2),
            Stage::Strategic => Some(3),
            Stage::Undergraduate => Some(4),
            Stage::Masters => Some(5),
            Stage::Doctoral => Some(6),
            Stage::Parent => Some(7),
        }
    }

    /// Stable key used in persisted records and stats maps.
    pub fn key(&self) -> &'static str {
        match self {
            Stage::Unknown => "unknown",
            Stage::Foundation => "1",
            Stage::Development => "2",
            Stage::Strategic => "3",
            Stage::Undergraduate => "4",
            Stage::Masters => "5",
            Stage::Doctoral => "6",
            Stage::Parent => "7",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::Unknown => "Unknown",
            Stage::Foundation => "Foundation",
            Stage::Development => "Development",
            Stage::Strategic => "Strategic",
            Stage::Undergraduate => "Undergraduate",
            Stage::Masters => "Masters",
            Stage::Doctoral => "Doctoral",
            Stage::Parent => "Parent",
        }
    }

    /// Interpret an arbitrary JSON value; anything unrecognised is `Unknown`.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_u64().map(Stage::from_number).unwrap_or_default(),
            Value::String(s) => s.parse().unwrap_or_default(),
            _ => Stage::Unknown,
        }
    }
}

impl FromStr for Stage {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("unknown") {
            return Ok(Stage::Unknown);
        }
        s.parse::<u64>()
            .ok()
            .map(Stage::from_number)
            .filter(|stage| *stage != Stage::Unknown)
            .ok_or(())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Stage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Stage::from_value(&value))
    }
}

// =============================================================================
// Language
// =============================================================================

/// Display language chosen in the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Lang {
    #[default]
    En,
    Bn,
}

impl Lang {
    pub const ALL: [Lang; 2] = [Lang::En, Lang::Bn];

    pub fn code(&self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Bn => "bn",
        }
    }
}

impl FromStr for Lang {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Lang::En),
            "bn" => Ok(Lang::Bn),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for Lang {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Lang {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(value
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default())
    }
}

// =============================================================================
// Inquiry source
// =============================================================================

/// Which branch of the relay served a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InquirySource {
    Faq,
    Ai,
    Fallback,
}

impl InquirySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InquirySource::Faq => "faq",
            InquirySource::Ai => "ai",
            InquirySource::Fallback => "fallback",
        }
    }
}

impl FromStr for InquirySource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faq" => Ok(InquirySource::Faq),
            "ai" => Ok(InquirySource::Ai),
            "fallback" => Ok(InquirySource::Fallback),
            _ => Err(()),
        }
    }
}

impl fmt::Display for InquirySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
