//! Derives the websocket endpoint for a conversation.
//!
//! The session identifier comes from the page address the questionnaire was
//! opened with, either as a query parameter or as the last path segment.

use crate::error::EndpointError;
use url::Url;

pub const DEFAULT_ENDPOINT_TEMPLATE: &str =
    "{scheme}://{host}/api/chat/questionnaire/start/{session_id}";

/// Query parameters that may carry the session identifier, in priority order.
const SESSION_QUERY_KEYS: [&str; 3] = ["session_id", "id_session", "sessionId"];

/// A `{scheme}://{host}/.../{session_id}` style endpoint template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate(String);

impl Default for EndpointTemplate {
    fn default() -> Self {
        Self(DEFAULT_ENDPOINT_TEMPLATE.to_string())
    }
}

impl EndpointTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, EndpointError> {
        let template = template.into();
        if !template.contains("{session_id}") {
            return Err(EndpointError::TemplateMissingSessionId);
        }
        Ok(Self(template))
    }

    /// Renders the endpoint for `session_id`, using `wss` when `secure`.
    pub fn render(&self, host: &str, secure: bool, session_id: &str) -> Result<String, EndpointError> {
        validate_session_id(session_id)?;
        let scheme = if secure { "wss" } else { "ws" };
        Ok(self
            .0
            .replace("{scheme}", scheme)
            .replace("{host}", host)
            .replace("{session_id}", session_id))
    }
}

/// Extracts the session identifier from the address the questionnaire page was opened with.
pub fn session_id_from_page(page_url: &str) -> Result<String, EndpointError> {
    let url = Url::parse(page_url).map_err(|e| EndpointError::InvalidPageUrl(e.to_string()))?;

    for key in SESSION_QUERY_KEYS {
        if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == key) {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            validate_session_id(&value)?;
            return Ok(value);
        }
    }

    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or(EndpointError::MissingSessionIdentifier)?;
    validate_session_id(segment)?;
    Ok(segment.to_string())
}

fn validate_session_id(session_id: &str) -> Result<(), EndpointError> {
    if session_id.is_empty() {
        return Err(EndpointError::MissingSessionIdentifier);
    }
    let valid = session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(EndpointError::InvalidSessionIdentifier(session_id.to_string()));
    }
    Ok(())
}
