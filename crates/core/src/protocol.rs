//! Defines the wire protocol between the questionnaire client and the chat server.
//!
//! Inbound frames are dispatched on their `type` discriminator into a closed
//! set of [`InboundMessage`] variants. Anything else is a [`DecodeError`] and
//! is dropped by the caller. Outbound frames always have the shape
//! `{ "content": ..., "metrics": { ... } }`.

use crate::error::DecodeError;
use crate::telemetry::EngagementMetrics;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The response shape the agent expects for the next user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    FreeText,
    SingleChoice,
    MultipleChoice,
}

impl AnswerType {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "free_text" | "text" => Some(Self::FreeText),
            "single_choice" => Some(Self::SingleChoice),
            "multiple_choice" => Some(Self::MultipleChoice),
            _ => None,
        }
    }
}

/// A turn produced by the remote agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub text: String,
    pub is_complete: bool,
    /// Set when the server re-delivers the current question after a reconnect.
    pub is_current_state_replay: bool,
    pub is_welcome: bool,
    pub answer_type: Option<AnswerType>,
    pub options: Vec<String>,
    /// Only populated when `is_complete` is true.
    pub summary: Option<Value>,
    pub timestamp: Option<String>,
}

/// Presentation directives pushed by the server, passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct UiConfig {
    pub payload: Value,
}

/// Avatar display directive carried by a `ui_config` frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Avatar {
    pub show: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl UiConfig {
    /// Interprets `avatar` as either a plain flag or a `{ show, url, name }` object.
    pub fn avatar(&self) -> Option<Avatar> {
        match self.payload.get("avatar")? {
            Value::Bool(show) => Some(Avatar {
                show: *show,
                url: None,
                name: None,
            }),
            value @ Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}

/// Every frame the state machine knows how to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    AgentResponse(AgentResponse),
    /// Server relay of an earlier user message, used to rebuild the transcript.
    UserEcho {
        text: String,
        timestamp: Option<String>,
    },
    UiConfig(UiConfig),
    ServerError {
        text: String,
        timestamp: Option<String>,
    },
    /// The server expired the session for inactivity and is about to close the socket.
    SessionExpired {
        text: String,
        timestamp: Option<String>,
    },
    AgentTyping(bool),
}

/// A user answer ready for the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub content: String,
    pub metrics: EngagementMetrics,
}

// --- Raw frame shapes ---

#[derive(Deserialize)]
struct AgentResponseFrame {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    data: Option<AgentResponseData>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Deserialize, Default)]
struct AgentResponseData {
    #[serde(default)]
    is_complete: Option<bool>,
    #[serde(default)]
    is_current_state: Option<bool>,
    #[serde(default)]
    is_welcome: Option<bool>,
    #[serde(default, rename = "answerType")]
    answer_type: Option<String>,
    #[serde(default)]
    options: Option<Vec<String>>,
    #[serde(default)]
    summary: Option<Value>,
}

#[derive(Deserialize)]
struct TextFrame {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Deserialize)]
struct TypingFrame {
    #[serde(default = "typing_default")]
    is_typing: bool,
}

fn typing_default() -> bool {
    true
}

#[derive(Deserialize)]
struct UiConfigFrame {
    #[serde(default)]
    data: Value,
}

fn parse_frame<'a, T: Deserialize<'a>>(kind: &'static str, value: &'a Value) -> Result<T, DecodeError> {
    T::deserialize(value).map_err(|source| DecodeError::InvalidFrame { kind, source })
}

/// Decodes one inbound frame.
pub fn decode(raw: &str) -> Result<InboundMessage, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(DecodeError::Malformed)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?;

    match kind {
        "agent_response" => {
            let frame: AgentResponseFrame = parse_frame("agent_response", &value)?;
            let data = frame.data.unwrap_or_default();
            let is_complete = data.is_complete.unwrap_or(false);
            let answer_type = data.answer_type.as_deref().and_then(|raw| {
                let parsed = AnswerType::parse(raw);
                if parsed.is_none() {
                    tracing::debug!(answer_type = raw, "Ignoring unknown answer type");
                }
                parsed
            });
            Ok(InboundMessage::AgentResponse(AgentResponse {
                text: frame.content.unwrap_or_default(),
                is_complete,
                is_current_state_replay: data.is_current_state.unwrap_or(false),
                is_welcome: data.is_welcome.unwrap_or(false),
                answer_type,
                options: data.options.unwrap_or_default(),
                summary: data.summary.filter(|s| is_complete && !s.is_null()),
                timestamp: frame.timestamp,
            }))
        }
        "user_message" => {
            let frame: TextFrame = parse_frame("user_message", &value)?;
            Ok(InboundMessage::UserEcho {
                text: frame.content.unwrap_or_default(),
                timestamp: frame.timestamp,
            })
        }
        "ui_config" => {
            let frame: UiConfigFrame = parse_frame("ui_config", &value)?;
            Ok(InboundMessage::UiConfig(UiConfig {
                payload: frame.data,
            }))
        }
        "error" => {
            let frame: TextFrame = parse_frame("error", &value)?;
            Ok(InboundMessage::ServerError {
                text: frame.content.unwrap_or_default(),
                timestamp: frame.timestamp,
            })
        }
        "timeout" => {
            let frame: TextFrame = parse_frame("timeout", &value)?;
            Ok(InboundMessage::SessionExpired {
                text: frame.content.unwrap_or_default(),
                timestamp: frame.timestamp,
            })
        }
        "typing_indicator" => {
            let frame: TypingFrame = parse_frame("typing_indicator", &value)?;
            Ok(InboundMessage::AgentTyping(frame.is_typing))
        }
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

/// Serializes an outbound answer. `content` must already be non-blank.
pub fn encode(message: &OutboundMessage) -> Result<String, serde_json::Error> {
    debug_assert!(!message.content.trim().is_empty());
    serde_json::to_string(message)
}
