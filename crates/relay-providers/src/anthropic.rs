//! Anthropic messages-API compatible translator
//!
//! Wire mechanics are delegated to the default [`AgentSdk`]; this layer only
//! redirects endpoint and credential, remaps the model, and applies the proxy
//! tool policy.

use relay_protocol::{Feature, InstallationStatus, ModelDefinition, ProviderProfile};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::deadline::CallDeadline;
use crate::messages_api::{API_KEY_VAR, BASE_URL_VAR};
use crate::model_mapping::map_model_to_remote;
use crate::openai::models_from_mapping;
use crate::request::QueryRequest;
use crate::stream::{forward_events, EventStream};
use crate::traits::{AgentSdk, ModelResult, PermissionMode, SdkQueryOptions};
use crate::ProviderError;

/// Variables copied from the process environment into proxy calls
pub const PASSTHROUGH_ENV_VARS: &[&str] = &["PATH", "HOME", "USER", "SHELL", "TERM", "LANG", "TMPDIR"];

/// Tools enabled when the caller does not restrict them
pub const DEFAULT_TOOLS: &[&str] = &[
    "Read",
    "Write",
    "Edit",
    "MultiEdit",
    "Bash",
    "Glob",
    "Grep",
    "LS",
    "WebFetch",
    "WebSearch",
    "TodoWrite",
    "NotebookEdit",
];

/// Environment for one proxy call: the passthrough allowlist plus the
/// endpoint and credential overrides. Nothing else is forwarded.
pub fn build_proxy_env<F>(profile: &ProviderProfile, lookup: F) -> HashMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut env: HashMap<String, String> = PASSTHROUGH_ENV_VARS
        .iter()
        .filter_map(|key| lookup(key).map(|value| (key.to_string(), value)))
        .collect();
    env.insert(
        BASE_URL_VAR.to_string(),
        profile.trimmed_base_url().to_string(),
    );
    env.insert(
        API_KEY_VAR.to_string(),
        profile.api_key.expose_secret().to_string(),
    );
    env
}

/// Provider bound to one `anthropic-compatible` profile
#[derive(Clone)]
pub struct AnthropicCompatibleProvider {
    profile: ProviderProfile,
    sdk: Arc<dyn AgentSdk>,
}

impl AnthropicCompatibleProvider {
    pub fn new(profile: ProviderProfile, sdk: Arc<dyn AgentSdk>) -> Self {
        Self { profile, sdk }
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    fn build_options(&self, request: &QueryRequest, deadline: &CallDeadline) -> SdkQueryOptions {
        let allowed_tools = request
            .allowed_tools
            .clone()
            .unwrap_or_else(|| DEFAULT_TOOLS.iter().map(|t| t.to_string()).collect());

        SdkQueryOptions {
            prompt: request.prompt.flatten(),
            model: map_model_to_remote(&request.model, &self.profile),
            system_prompt: request.system_prompt.clone(),
            max_turns: request.max_turns,
            cwd: request.cwd.clone(),
            env: build_proxy_env(&self.profile, |key| std::env::var(key).ok()),
            allowed_tools,
            // Proxy calls run unattended; confirmation is never requested
            permission_mode: PermissionMode::BypassPermissions,
            abort: deadline.token().clone(),
            timeout: Some(deadline.timeout()),
            resume: request.resume.clone(),
            session_id: request.resolve_session_id(),
        }
    }

    pub async fn stream_query(&self, request: &QueryRequest) -> ModelResult<EventStream> {
        let deadline = CallDeadline::new(
            Duration::from_millis(self.profile.timeout),
            request.cancel.as_ref(),
        );
        let options = self.build_options(request, &deadline);
        let session_id = options.session_id.clone();

        debug!(
            profile_id = %self.profile.id,
            model = %request.model,
            remote_model = %options.model,
            "delegating to messages SDK"
        );

        let inner = deadline
            .guard(self.sdk.query(options))
            .await
            .and_then(|queried| queried)
            .map_err(|e| e.with_profile(&self.profile))?;

        let (sender, stream) = EventStream::channel(session_id);
        let profile = self.profile.clone();
        tokio::spawn(async move {
            if let Err(err) = forward_events(inner, &deadline, &sender).await {
                let err: ProviderError = err.with_profile(&profile);
                warn!(profile_id = %profile.id, error = %err, "messages proxy stream failed");
                sender.fail(err).await;
            }
        });

        Ok(stream)
    }

    pub async fn detect_installation(&self) -> InstallationStatus {
        InstallationStatus {
            installed: true,
            method: Some("http".to_string()),
            version: None,
            authenticated: self.profile.has_api_key(),
            error: None,
        }
    }

    pub fn get_available_models(&self) -> Vec<ModelDefinition> {
        models_from_mapping(&self.profile)
    }

    pub fn supports_feature(&self, feature: Feature) -> bool {
        matches!(
            feature,
            Feature::Streaming | Feature::Tools | Feature::Vision | Feature::SessionResume
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_protocol::{ProfileType, StreamEvent};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSdk {
        seen: Mutex<Vec<SdkQueryOptions>>,
    }

    #[async_trait]
    impl AgentSdk for RecordingSdk {
        async fn query(&self, options: SdkQueryOptions) -> ModelResult<EventStream> {
            let session_id = options.session_id.clone();
            self.seen.lock().unwrap().push(options);
            Ok(EventStream::from_items(
                session_id.clone(),
                vec![
                    Ok(StreamEvent::text_delta(&session_id, "ok")),
                    Ok(StreamEvent::result(&session_id, "ok")),
                ],
            ))
        }

        async fn detect_installation(&self) -> InstallationStatus {
            InstallationStatus::default()
        }

        fn available_models(&self) -> Vec<ModelDefinition> {
            Vec::new()
        }
    }

    fn profile() -> ProviderProfile {
        ProviderProfile::new(
            "p1",
            "Proxy",
            ProfileType::AnthropicCompatible,
            "https://proxy.example.com//",
            "sk-proxy",
        )
        .with_mapping("sonnet", "claude-sonnet-4-5-proxy")
    }

    #[test]
    fn test_proxy_env_is_allowlisted() {
        let env = build_proxy_env(&profile(), |key| match key {
            "PATH" => Some("/usr/bin".to_string()),
            "HOME" => Some("/home/me".to_string()),
            _ => None,
        });
        let mut keys: Vec<_> = env.keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![API_KEY_VAR, BASE_URL_VAR, "HOME", "PATH"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert_eq!(env[BASE_URL_VAR], "https://proxy.example.com");
        assert_eq!(env[API_KEY_VAR], "sk-proxy");
    }

    #[tokio::test]
    async fn test_stream_query_remaps_model_and_bypasses_permissions() {
        let sdk = Arc::new(RecordingSdk::default());
        let provider = AnthropicCompatibleProvider::new(profile(), sdk.clone());

        let events = provider
            .stream_query(&QueryRequest::new("SONNET", "hello"))
            .await
            .unwrap()
            .collect_events()
            .await
            .unwrap();
        assert_eq!(events.len(), 2);

        let seen = sdk.seen.lock().unwrap();
        let options = &seen[0];
        assert_eq!(options.model, "claude-sonnet-4-5-proxy");
        assert_eq!(options.permission_mode, PermissionMode::BypassPermissions);
        assert_eq!(options.allowed_tools.len(), DEFAULT_TOOLS.len());
        assert_eq!(options.timeout, Some(Duration::from_millis(30_000)));
    }

    #[tokio::test]
    async fn test_caller_tool_restriction_is_kept() {
        let sdk = Arc::new(RecordingSdk::default());
        let provider = AnthropicCompatibleProvider::new(profile(), sdk.clone());
        let request =
            QueryRequest::new("sonnet", "hello").with_allowed_tools(vec!["Read".to_string()]);

        provider
            .stream_query(&request)
            .await
            .unwrap()
            .collect_events()
            .await
            .unwrap();

        assert_eq!(sdk.seen.lock().unwrap()[0].allowed_tools, vec!["Read"]);
    }

    #[tokio::test]
    async fn test_sdk_failure_is_annotated_with_profile() {
        struct FailingSdk;

        #[async_trait]
        impl AgentSdk for FailingSdk {
            async fn query(&self, _options: SdkQueryOptions) -> ModelResult<EventStream> {
                Err(ProviderError::AuthenticationFailed("bad key".into()))
            }

            async fn detect_installation(&self) -> InstallationStatus {
                InstallationStatus::default()
            }

            fn available_models(&self) -> Vec<ModelDefinition> {
                Vec::new()
            }
        }

        let provider = AnthropicCompatibleProvider::new(profile(), Arc::new(FailingSdk));
        let err = match provider.stream_query(&QueryRequest::new("sonnet", "x")).await {
            Err(err) => err,
            Ok(_) => panic!("expected failure"),
        };
        assert_eq!(err.profile_id(), Some("p1"));
        assert_eq!(err.profile_name(), Some("Proxy"));
        assert_eq!(err.kind(), crate::ErrorKind::Auth);
    }
}
