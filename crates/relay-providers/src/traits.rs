//! Default SDK collaborator interface

use async_trait::async_trait;
use relay_protocol::{InstallationStatus, ModelDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::stream::EventStream;
use crate::ProviderError;

/// Result type for provider operations
pub type ModelResult<T> = Result<T, ProviderError>;

/// Tool permission policy handed to the SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    /// No confirmation for any tool, including destructive ones
    BypassPermissions,
    Plan,
}

/// Options for one streaming SDK call
#[derive(Clone)]
pub struct SdkQueryOptions {
    pub prompt: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub max_turns: Option<u32>,
    pub cwd: Option<PathBuf>,
    /// Complete environment for the call; nothing else is inherited
    pub env: HashMap<String, String>,
    pub allowed_tools: Vec<String>,
    pub permission_mode: PermissionMode,
    pub abort: CancellationToken,
    pub timeout: Option<Duration>,
    pub resume: Option<String>,
    pub session_id: String,
}

impl std::fmt::Debug for SdkQueryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut env_keys: Vec<&String> = self.env.keys().collect();
        env_keys.sort();
        f.debug_struct("SdkQueryOptions")
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt.is_some())
            .field("max_turns", &self.max_turns)
            .field("cwd", &self.cwd)
            .field("env_keys", &env_keys)
            .field("allowed_tools", &self.allowed_tools)
            .field("permission_mode", &self.permission_mode)
            .field("timeout", &self.timeout)
            .field("resume", &self.resume)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// The agent SDK that backs the default provider
///
/// Implementations yield events already shaped as [`relay_protocol::StreamEvent`].
#[async_trait]
pub trait AgentSdk: Send + Sync {
    async fn query(&self, options: SdkQueryOptions) -> ModelResult<EventStream>;

    async fn detect_installation(&self) -> InstallationStatus;

    fn available_models(&self) -> Vec<ModelDefinition>;
}
