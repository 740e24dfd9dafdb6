//! Normalized stream events emitted by every translator

use serde::{Deserialize, Serialize};

/// One event in a provider's response stream
///
/// Every wire protocol is decoded into this shape. A successful stream ends
/// with exactly one [`StreamEvent::Result`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text
    AssistantTextDelta { session_id: String, text: String },

    /// A completed tool invocation requested by the model
    AssistantToolCall {
        session_id: String,
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Terminal event carrying the accumulated assistant text
    Result {
        session_id: String,
        result: String,
        #[serde(default)]
        is_error: bool,
    },

    /// Stream ended abnormally
    Error {
        session_id: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
    },
}

impl StreamEvent {
    pub fn text_delta(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::AssistantTextDelta {
            session_id: session_id.into(),
            text: text.into(),
        }
    }

    pub fn result(session_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self::Result {
            session_id: session_id.into(),
            result: result.into(),
            is_error: false,
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::AssistantTextDelta { session_id, .. }
            | Self::AssistantToolCall { session_id, .. }
            | Self::Result { session_id, .. }
            | Self::Error { session_id, .. } => session_id,
        }
    }

    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Result { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagging() {
        let event = StreamEvent::text_delta("s1", "Hi");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "assistant_text_delta");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["text"], "Hi");
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::result("s", "done").is_terminal());
        assert!(!StreamEvent::text_delta("s", "x").is_terminal());
        let tool = StreamEvent::AssistantToolCall {
            session_id: "s".into(),
            id: "call_1".into(),
            name: "read".into(),
            input: serde_json::json!({}),
        };
        assert!(!tool.is_terminal());
        assert_eq!(tool.session_id(), "s");
    }
}
