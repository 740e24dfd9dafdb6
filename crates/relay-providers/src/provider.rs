//! Closed set of provider variants behind one capability surface

use relay_protocol::{Feature, InstallationStatus, ModelDefinition, ProfileType, ProviderProfile};
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::anthropic::{AnthropicCompatibleProvider, DEFAULT_TOOLS};
use crate::openai::OpenAiCompatibleProvider;
use crate::request::QueryRequest;
use crate::stream::EventStream;
use crate::traits::{AgentSdk, ModelResult, SdkQueryOptions};

pub const DEFAULT_PROVIDER_NAME: &str = "claude";

/// The default provider: the agent SDK with the caller's own environment
#[derive(Clone)]
pub struct ClaudeProvider {
    sdk: Arc<dyn AgentSdk>,
}

impl ClaudeProvider {
    pub fn new(sdk: Arc<dyn AgentSdk>) -> Self {
        Self { sdk }
    }

    pub async fn stream_query(&self, request: &QueryRequest) -> ModelResult<EventStream> {
        let options = SdkQueryOptions {
            prompt: request.prompt.flatten(),
            model: request.model.clone(),
            system_prompt: request.system_prompt.clone(),
            max_turns: request.max_turns,
            cwd: request.cwd.clone(),
            env: std::env::vars().collect::<HashMap<_, _>>(),
            allowed_tools: request
                .allowed_tools
                .clone()
                .unwrap_or_else(|| DEFAULT_TOOLS.iter().map(|t| t.to_string()).collect()),
            permission_mode: request.permission_mode.unwrap_or_default(),
            abort: request.cancel.clone().unwrap_or_default(),
            timeout: None,
            resume: request.resume.clone(),
            session_id: request.resolve_session_id(),
        };
        debug!(model = %options.model, "querying default SDK");
        self.sdk.query(options).await
    }
}

/// A provider instance, one arm per backend family
///
/// A profile's type picks the arm when the provider is built; changing the
/// type means building a new provider.
#[derive(Clone)]
pub enum Provider {
    Claude(ClaudeProvider),
    AnthropicCompatible(AnthropicCompatibleProvider),
    OpenAiCompatible(OpenAiCompatibleProvider),
}

impl Provider {
    pub fn claude(sdk: Arc<dyn AgentSdk>) -> Self {
        Self::Claude(ClaudeProvider::new(sdk))
    }

    /// Build the provider matching `profile.profile_type`
    pub fn for_profile(profile: ProviderProfile, sdk: Arc<dyn AgentSdk>, client: Client) -> Self {
        match profile.profile_type {
            ProfileType::AnthropicCompatible => {
                Self::AnthropicCompatible(AnthropicCompatibleProvider::new(profile, sdk))
            }
            ProfileType::OpenaiCompatible => {
                Self::OpenAiCompatible(OpenAiCompatibleProvider::new(profile, client))
            }
        }
    }

    /// `"claude"` for the default provider, `profile:<id>` otherwise
    pub fn name(&self) -> String {
        match self.profile() {
            Some(profile) => format!("profile:{}", profile.id),
            None => DEFAULT_PROVIDER_NAME.to_string(),
        }
    }

    pub fn profile(&self) -> Option<&ProviderProfile> {
        match self {
            Self::Claude(_) => None,
            Self::AnthropicCompatible(p) => Some(p.profile()),
            Self::OpenAiCompatible(p) => Some(p.profile()),
        }
    }

    pub async fn stream_query(&self, request: &QueryRequest) -> ModelResult<EventStream> {
        match self {
            Self::Claude(p) => p.stream_query(request).await,
            Self::AnthropicCompatible(p) => p.stream_query(request).await,
            Self::OpenAiCompatible(p) => p.stream_query(request).await,
        }
    }

    pub async fn detect_installation(&self) -> InstallationStatus {
        match self {
            Self::Claude(p) => p.sdk.detect_installation().await,
            Self::AnthropicCompatible(p) => p.detect_installation().await,
            Self::OpenAiCompatible(p) => p.detect_installation().await,
        }
    }

    pub fn get_available_models(&self) -> Vec<ModelDefinition> {
        match self {
            Self::Claude(p) => p.sdk.available_models(),
            Self::AnthropicCompatible(p) => p.get_available_models(),
            Self::OpenAiCompatible(p) => p.get_available_models(),
        }
    }

    pub fn supports_feature(&self, feature: Feature) -> bool {
        match self {
            Self::Claude(_) => true,
            Self::AnthropicCompatible(p) => p.supports_feature(feature),
            Self::OpenAiCompatible(p) => p.supports_feature(feature),
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Provider").field(&self.name()).finish()
    }
}
