//! Relay Providers - provider abstraction and fallback routing
//!
//! This crate turns one normalized request into a stream of
//! [`relay_protocol::StreamEvent`]s through one of several backends:
//! - the default agent SDK (`claude`)
//! - Anthropic messages-API compatible proxies
//! - OpenAI chat-completions compatible proxies
//!
//! and walks an ordered fallback chain across them.

mod anthropic;
mod client;
mod deadline;
mod error;
mod error_classify;
mod fallback;
mod messages_api;
mod model_mapping;
mod openai;
mod provider;
mod registry;
mod request;
mod sse;
mod ssrf;
mod stream;
pub mod testing;
mod traits;

pub use anthropic::{build_proxy_env, AnthropicCompatibleProvider, DEFAULT_TOOLS, PASSTHROUGH_ENV_VARS};
pub use client::HttpClientBuilder;
pub use connection_test::test_connection;
pub use deadline::CallDeadline;
pub use error::{ErrorKind, ProviderError};
pub use error_classify::{classify_http_error, parse_retry_after, truncate_body, MAX_ERROR_BODY_CHARS};
pub use fallback::{classify_model_affinity, execute_chain, FallbackExecutor, FALLBACK_LOG_TARGET};
pub use messages_api::{MessagesApiSdk, API_KEY_VAR, BASE_URL_VAR};
pub use model_mapping::{map_model_from_remote, map_model_to_remote};
pub use openai::{OpenAiCompatibleProvider, OpenAiStreamState};
pub use provider::{ClaudeProvider, Provider, DEFAULT_PROVIDER_NAME};
pub use registry::{
    default_registry, is_claude_model, ModelPredicate, ProviderFactory, ProviderRegistration,
    ProviderRegistry, RegistrationOptions,
};
pub use request::QueryRequest;
pub use secrecy::SecretString;
pub use sse::{SseEvent, DONE_SENTINEL};
pub use ssrf::{validate_base_url_ssrf, SsrfCheck};
pub use stream::{EventResult, EventSender, EventStream, StreamOutcome, EVENT_CHANNEL_CAPACITY};
pub use tokio_util::sync::CancellationToken;
pub use traits::{AgentSdk, ModelResult, PermissionMode, SdkQueryOptions};
