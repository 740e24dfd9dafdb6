//! Normalized request accepted by every provider

use relay_protocol::{Prompt, SessionId};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::traits::PermissionMode;

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub prompt: Prompt,
    /// Local model name; profile-backed providers remap it
    pub model: String,
    pub system_prompt: Option<String>,
    pub max_turns: Option<u32>,
    pub cwd: Option<PathBuf>,
    /// `None` enables the provider's default tool set
    pub allowed_tools: Option<Vec<String>>,
    pub permission_mode: Option<PermissionMode>,
    pub resume: Option<String>,
    pub session_id: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl QueryRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<Prompt>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system_prompt: None,
            max_turns: None,
            cwd: None,
            allowed_tools: None,
            permission_mode: None,
            resume: None,
            session_id: None,
            cancel: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    pub fn with_resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume = Some(session_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = Some(mode);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Session id for emitted events: explicit id, then resumed id, then a fresh one
    pub fn resolve_session_id(&self) -> String {
        self.session_id
            .clone()
            .or_else(|| self.resume.clone())
            .unwrap_or_else(|| SessionId::new().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_precedence() {
        let req = QueryRequest::new("gpt-4o", "hi");
        assert!(!req.resolve_session_id().is_empty());

        let req = QueryRequest::new("gpt-4o", "hi").with_resume("resumed");
        assert_eq!(req.resolve_session_id(), "resumed");

        let req = QueryRequest::new("gpt-4o", "hi")
            .with_resume("resumed")
            .with_session_id("explicit");
        assert_eq!(req.resolve_session_id(), "explicit");
    }

    #[test]
    fn test_cancelled_token_is_visible() {
        let token = CancellationToken::new();
        let req = QueryRequest::new("gpt-4o", "hi").with_cancel(token.clone());
        assert!(!req.is_cancelled());
        token.cancel();
        assert!(req.is_cancelled());
        assert!(!QueryRequest::new("gpt-4o", "hi").is_cancelled());
    }
}
