//! Prompt shapes accepted by the translators

use serde::{Deserialize, Serialize};

/// User prompt, either plain text or a list of content parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Parts(Vec<PromptPart>),
}

/// One content part of a structured prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPart {
    #[serde(rename = "type", default = "default_part_type")]
    pub part_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn default_part_type() -> String {
    "text".to_string()
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            part_type: default_part_type(),
            text: Some(text.into()),
        }
    }
}

impl Prompt {
    /// Flatten into a single string; parts are joined with a newline and
    /// parts without text are skipped.
    pub fn flatten(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}
