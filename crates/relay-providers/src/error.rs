//! Provider error types

use relay_protocol::ProviderProfile;
use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a [`ProviderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Cancelled,
    Auth,
    RateLimit,
    Protocol,
    Configuration,
    Upstream,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Protocol => "protocol",
            Self::Configuration => "configuration",
            Self::Upstream => "upstream",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {message}")]
    Timeout { message: String },

    #[error("request cancelled")]
    Cancelled,

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("rate limit exceeded{}", .retry_after_ms.map(|ms| format!(": retry after {}ms", ms)).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("upstream error {status} {reason}: {body}")]
    Upstream {
        status: u16,
        reason: String,
        body: String,
    },

    /// Any of the above, annotated with the profile that produced it
    #[error("profile '{profile_name}' ({profile_id}): {source}")]
    Profile {
        profile_id: String,
        profile_name: String,
        #[source]
        source: Box<ProviderError>,
    },

    /// Every candidate of a fallback chain failed; carries the last error
    #[error("all {attempts} providers failed, last error: {last}")]
    FallbackExhausted {
        attempts: usize,
        #[source]
        last: Box<ProviderError>,
    },
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::AuthenticationFailed(_) => ErrorKind::Auth,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Upstream { .. } => ErrorKind::Upstream,
            Self::Profile { source, .. } => source.kind(),
            Self::FallbackExhausted { last, .. } => last.kind(),
        }
    }

    /// Attach profile identity. Already-annotated errors are left unchanged.
    pub fn with_profile(self, profile: &ProviderProfile) -> Self {
        match self {
            Self::Profile { .. } | Self::FallbackExhausted { .. } => self,
            other => Self::Profile {
                profile_id: profile.id.clone(),
                profile_name: profile.name.clone(),
                source: Box::new(other),
            },
        }
    }

    pub fn profile_id(&self) -> Option<&str> {
        match self {
            Self::Profile { profile_id, .. } => Some(profile_id),
            Self::FallbackExhausted { last, .. } => last.profile_id(),
            _ => None,
        }
    }

    pub fn profile_name(&self) -> Option<&str> {
        match self {
            Self::Profile { profile_name, .. } => Some(profile_name),
            Self::FallbackExhausted { last, .. } => last.profile_name(),
            _ => None,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => *retry_after_ms,
            Self::Profile { source, .. } => source.retry_after_ms(),
            Self::FallbackExhausted { last, .. } => last.retry_after_ms(),
            _ => None,
        }
    }

    /// The innermost error with profile and fallback wrappers removed
    pub fn root(&self) -> &ProviderError {
        match self {
            Self::Profile { source, .. } => source.root(),
            Self::FallbackExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn is_fallback_exhausted(&self) -> bool {
        matches!(self, Self::FallbackExhausted { .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        crate::error_classify::classify_transport_error(&err)
    }
}
