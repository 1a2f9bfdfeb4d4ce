//! The append-only conversation transcript.

use serde::Serialize;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
    System,
}

/// A single line of the conversation as the UI renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
    /// Server timestamp, present only on entries created from server frames that carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Marks the agent's opening greeting so the UI can style it apart.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_welcome: bool,
}

impl TranscriptEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
            is_welcome: false,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<String>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn welcome(mut self, is_welcome: bool) -> Self {
        self.is_welcome = is_welcome;
        self
    }
}

/// Ordered, append-only sequence of entries for one session.
///
/// Entries are never mutated, removed or reordered once pushed.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry and returns a reference to it.
    pub fn push(&mut self, entry: TranscriptEntry) -> &TranscriptEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_preserves_order() {
        let mut transcript = Transcript::new();
        transcript.push(TranscriptEntry::new(Role::Agent, "Hi"));
        transcript.push(TranscriptEntry::new(Role::User, "Hello"));

        let roles: Vec<Role> = transcript.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::Agent, Role::User]);
        assert_eq!(transcript.last().map(|e| e.content.as_str()), Some("Hello"));
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut transcript = Transcript::new();
        transcript.push(TranscriptEntry::new(Role::System, "offline"));
        let json = serde_json::to_value(&transcript).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "role": "system", "content": "offline" }])
        );
    }

    #[test]
    fn test_welcome_flag_only_serialized_when_set() {
        let greeting = TranscriptEntry::new(Role::Agent, "Hola").welcome(true);
        assert_eq!(
            serde_json::to_value(&greeting).unwrap(),
            serde_json::json!({ "role": "agent", "content": "Hola", "is_welcome": true })
        );
    }
}
