//! HTTP and transport error classification
//!
//! Upstream proxies return errors in the OpenAI nested format
//! (`{"error": {"message": "...", "type": "...", "code": "..."}}`), the
//! Anthropic format (`{"type": "error", "error": {"type": "...", "message": "..."}}`),
//! a flat object, or plain text. Status codes are checked first, then the
//! message and code are matched against known patterns.

use crate::error::ProviderError;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

/// Upstream bodies are truncated to this many characters in error values
pub const MAX_ERROR_BODY_CHARS: usize = 500;

lazy_static! {
    static ref RATE_LIMIT_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)rate_limit_exceeded").unwrap(),
        Regex::new(r"(?i)rate[_\s]?limit").unwrap(),
        Regex::new(r"(?i)too many requests").unwrap(),
        Regex::new(r"(?i)resource_exhausted").unwrap(),
    ];

    static ref AUTH_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)invalid[_\s]?api[_\s]?key").unwrap(),
        Regex::new(r"(?i)incorrect api key").unwrap(),
        Regex::new(r"(?i)authentication_error").unwrap(),
        Regex::new(r"(?i)permission_error").unwrap(),
    ];

    static ref TIMEOUT_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\btimeout\b").unwrap(),
        Regex::new(r"(?i)timed out").unwrap(),
        Regex::new(r"(?i)deadline exceeded").unwrap(),
    ];
}

#[derive(Debug, Deserialize)]
struct NestedErrorResponse {
    error: NestedError,
}

#[derive(Debug, Deserialize)]
struct NestedError {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FlatErrorResponse {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct UpstreamErrorInfo {
    pub message: String,
    pub error_type: Option<String>,
    pub code: Option<String>,
}

fn code_to_string(code: Option<serde_json::Value>) -> Option<String> {
    match code? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Parse an error body, trying the nested format first then flat
pub fn parse_error_body(body: &str) -> UpstreamErrorInfo {
    if let Ok(nested) = serde_json::from_str::<NestedErrorResponse>(body) {
        return UpstreamErrorInfo {
            message: nested.error.message.unwrap_or_else(|| body.to_string()),
            error_type: nested.error.error_type,
            code: code_to_string(nested.error.code),
        };
    }

    if let Ok(flat) = serde_json::from_str::<FlatErrorResponse>(body) {
        if flat.message.is_some() || flat.error_type.is_some() || flat.code.is_some() {
            return UpstreamErrorInfo {
                message: flat.message.unwrap_or_else(|| body.to_string()),
                error_type: flat.error_type,
                code: code_to_string(flat.code),
            };
        }
    }

    UpstreamErrorInfo {
        message: body.to_string(),
        error_type: None,
        code: None,
    }
}

/// Truncate to [`MAX_ERROR_BODY_CHARS`] characters on a char boundary
pub fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Parse a `Retry-After` header value given in seconds
pub fn parse_retry_after(value: &str) -> Option<u64> {
    let secs: f64 = value.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some((secs * 1000.0) as u64)
    } else {
        None
    }
}

fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Classify a non-2xx HTTP response
///
/// # Arguments
/// * `status` - HTTP status code
/// * `reason` - Canonical reason phrase for the status
/// * `body` - Raw response body
/// * `retry_after` - Raw `Retry-After` header, if the upstream sent one
pub fn classify_http_error(
    status: u16,
    reason: &str,
    body: &str,
    retry_after: Option<&str>,
) -> ProviderError {
    let info = parse_error_body(body);
    let code = info.code.as_deref();
    let error_type = info.error_type.as_deref();

    match status {
        401 | 403 => return ProviderError::AuthenticationFailed(truncate_body(&info.message)),
        429 => {
            return ProviderError::RateLimited {
                retry_after_ms: retry_after.and_then(parse_retry_after),
            }
        }
        408 | 504 => {
            return ProviderError::Timeout {
                message: truncate_body(&info.message),
            }
        }
        _ => {}
    }

    if code == Some("rate_limit_exceeded")
        || error_type == Some("rate_limit_error")
        || matches_any(&RATE_LIMIT_PATTERNS, &info.message)
    {
        return ProviderError::RateLimited {
            retry_after_ms: retry_after.and_then(parse_retry_after),
        };
    }

    if code == Some("invalid_api_key")
        || error_type == Some("authentication_error")
        || matches_any(&AUTH_PATTERNS, &info.message)
    {
        return ProviderError::AuthenticationFailed(truncate_body(&info.message));
    }

    if matches_any(&TIMEOUT_PATTERNS, &info.message) {
        return ProviderError::Timeout {
            message: truncate_body(&info.message),
        };
    }

    ProviderError::Upstream {
        status,
        reason: reason.to_string(),
        body: truncate_body(body),
    }
}

/// Classify a failed response, reading its body
pub async fn classify_response(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();

    classify_http_error(
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        &body,
        retry_after.as_deref(),
    )
}

/// Classify a `reqwest` transport failure
pub fn classify_transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout {
            message: err.to_string(),
        }
    } else if err.is_decode() {
        ProviderError::Protocol(err.to_string())
    } else if err.is_builder() {
        ProviderError::Configuration(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}
