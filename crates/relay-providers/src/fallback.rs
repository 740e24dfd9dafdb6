//! Ordered fallback across profile-backed providers and the default provider

use std::future::Future;
use std::sync::Arc;

use relay_protocol::{ProfileType, ProviderProfile};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::provider::Provider;
use crate::registry::{is_claude_model, ProviderRegistry};
use crate::request::QueryRequest;
use crate::stream::EventStream;
use crate::traits::{AgentSdk, ModelResult};
use crate::{ErrorKind, ProviderError};

pub const FALLBACK_LOG_TARGET: &str = "relay_providers::fallback";

/// Profile type a model id naturally belongs to, if any
pub fn classify_model_affinity(model_id: &str) -> Option<ProfileType> {
    let lower = model_id.to_lowercase();
    if is_claude_model(&lower) {
        Some(ProfileType::AnthropicCompatible)
    } else if lower.starts_with("gpt-") || lower.starts_with("o1") || lower.starts_with("o3") {
        Some(ProfileType::OpenaiCompatible)
    } else {
        None
    }
}

/// Builds fallback chains and walks them strictly in order
#[derive(Clone)]
pub struct FallbackExecutor {
    registry: Arc<ProviderRegistry>,
    sdk: Arc<dyn AgentSdk>,
    client: Client,
}

impl FallbackExecutor {
    pub fn new(registry: Arc<ProviderRegistry>, sdk: Arc<dyn AgentSdk>, client: Client) -> Self {
        Self {
            registry,
            sdk,
            client,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Active profiles matching the model's affinity, then the registry default
    ///
    /// `profiles` is expected in descending priority order.
    pub fn build_fallback_chain(
        &self,
        model_id: &str,
        profiles: &[ProviderProfile],
    ) -> ModelResult<Vec<Provider>> {
        let mut chain = Vec::new();

        if let Some(affinity) = classify_model_affinity(model_id) {
            chain.extend(
                profiles
                    .iter()
                    .filter(|p| p.is_active && p.profile_type == affinity)
                    .map(|p| Provider::for_profile(p.clone(), self.sdk.clone(), self.client.clone())),
            );
        }

        chain.push(self.registry.resolve_provider(model_id)?);

        debug!(
            model = %model_id,
            chain = ?chain.iter().map(Provider::name).collect::<Vec<_>>(),
            "built fallback chain"
        );
        Ok(chain)
    }

    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        model_id: &str,
        profiles: &[ProviderProfile],
        operation: F,
    ) -> ModelResult<T>
    where
        F: FnMut(Provider) -> Fut,
        Fut: Future<Output = ModelResult<T>>,
    {
        let chain = self.build_fallback_chain(model_id, profiles)?;
        execute_chain(chain, operation).await
    }

    /// Open a stream on the first provider that accepts the request
    ///
    /// Fallback covers failures before the stream is handed back. Errors after
    /// that arrive as the stream's final item.
    pub async fn stream_with_fallback(
        &self,
        request: &QueryRequest,
        profiles: &[ProviderProfile],
    ) -> ModelResult<EventStream> {
        self.execute_with_fallback(&request.model, profiles, |provider| {
            let request = request.clone();
            async move {
                if request.is_cancelled() {
                    return Err(ProviderError::Cancelled);
                }
                provider.stream_query(&request).await
            }
        })
        .await
    }
}

/// Try each provider in order; return the first success
///
/// Every failure is logged at `warn` under [`FALLBACK_LOG_TARGET`]. When the
/// chain is exhausted the last error is returned inside
/// [`ProviderError::FallbackExhausted`]. A cancellation ends the walk at once
/// and is returned as is.
pub async fn execute_chain<T, F, Fut>(chain: Vec<Provider>, mut operation: F) -> ModelResult<T>
where
    F: FnMut(Provider) -> Fut,
    Fut: Future<Output = ModelResult<T>>,
{
    let attempts = chain.len();
    let mut last_error = None;

    for (index, provider) in chain.into_iter().enumerate() {
        let name = provider.name();
        match operation(provider).await {
            Ok(value) => {
                if index > 0 {
                    info!(target: FALLBACK_LOG_TARGET, provider = %name, attempt = index + 1, "fallback provider succeeded");
                }
                return Ok(value);
            }
            Err(err) if err.kind() == ErrorKind::Cancelled => {
                info!(target: FALLBACK_LOG_TARGET, provider = %name, attempt = index + 1, "request cancelled, fallback stopped");
                return Err(err);
            }
            Err(err) => {
                warn!(
                    target: FALLBACK_LOG_TARGET,
                    provider = %name,
                    attempt = index + 1,
                    of = attempts,
                    kind = %err.kind(),
                    error = %err,
                    "provider failed"
                );
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(last) => Err(ProviderError::FallbackExhausted {
            attempts,
            last: Box::new(last),
        }),
        None => Err(ProviderError::Configuration(
            "fallback chain is empty".to_string(),
        )),
    }
}
