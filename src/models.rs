//! Core data models shared across the ingestion and retrieval pipelines.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plain-text output of a format-specific reader: one ingested file's text.
#[derive(Debug, Clone)]
pub struct TextUnit {
    pub source_file: String,
    pub text: String,
}

/// A fixed-size window of a text unit, the atomic retrieval/extraction unit.
///
/// Chunks are immutable once created and are only removed as part of
/// whole-scope deletion (or wholesale replacement of a re-ingested file).
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub scope: String,
    pub source_file: String,
    pub chunk_index: i64,
    /// Character offset of the window start within the source text.
    pub offset: i64,
    pub text: String,
}

impl Chunk {
    pub fn new(scope: &str, source_file: &str, chunk_index: i64, offset: i64, text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scope: scope.to_string(),
            source_file: source_file.to_string(),
            chunk_index,
            offset,
            text: text.to_string(),
        }
    }
}

/// A subject–predicate–object fact tagged with its originating scope.
///
/// All three terms are trimmed and lower-cased before storage so that the
/// graph merge key is stable regardless of model casing variance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    pub scope: String,
}

impl Triple {
    /// Build a triple with normalized (trimmed, lower-cased) terms.
    pub fn normalized(subject: &str, predicate: &str, object: &str, scope: &str) -> Self {
        Self {
            subject: subject.trim().to_lowercase(),
            predicate: predicate.trim().to_lowercase(),
            object: object.trim().to_lowercase(),
            scope: scope.to_string(),
        }
    }
}

/// A single role-tagged message in the chat wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.to_string(),
        }
    }
}

/// Ordered conversation history owned by the caller of the retriever.
///
/// Grows by appending; never mutated retroactively. The caller resets it
/// when the active scope changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    pub messages: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn has_system_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == "system")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triple_normalization_trims_and_lowercases() {
        let t = Triple::normalized("  NASA ", "Launched", " Artemis I ", "space");
        assert_eq!(t.subject, "nasa");
        assert_eq!(t.predicate, "launched");
        assert_eq!(t.object, "artemis i");
        assert_eq!(t.scope, "space");
    }

    #[test]
    fn conversation_state_starts_empty() {
        let state = ConversationState::new();
        assert!(state.is_empty());
        assert!(!state.has_system_message());
    }
}
