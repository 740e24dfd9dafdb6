//! Base URL validation against private and internal network addresses
//!
//! Hostnames are matched against string patterns only. There is no DNS
//! resolution and no numeric range arithmetic, so literal forms the URL parser
//! does not normalize (IPv4-mapped IPv6, for example) are not caught.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use url::Url;

lazy_static! {
    static ref INTERNAL_HOST_PATTERNS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"^localhost$").unwrap(), "localhost"),
        (Regex::new(r"^127\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap(), "loopback"),
        (Regex::new(r"^::1$").unwrap(), "IPv6 loopback"),
        (Regex::new(r"^10\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap(), "private network"),
        (
            Regex::new(r"^172\.(1[6-9]|2\d|3[01])\.\d{1,3}\.\d{1,3}$").unwrap(),
            "private network",
        ),
        (Regex::new(r"^192\.168\.\d{1,3}\.\d{1,3}$").unwrap(), "private network"),
        (Regex::new(r"^169\.254\.\d{1,3}\.\d{1,3}$").unwrap(), "link-local"),
        (Regex::new(r"^0\.0\.0\.0$").unwrap(), "unspecified address"),
        (Regex::new(r"^fe80:").unwrap(), "IPv6 link-local"),
        (Regex::new(r"^fc00:").unwrap(), "IPv6 unique-local"),
        (Regex::new(r"^fd00:").unwrap(), "IPv6 unique-local"),
    ];
}

/// Result of [`validate_base_url_ssrf`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SsrfCheck {
    pub safe: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bypassed_by_user: bool,
}

impl SsrfCheck {
    fn safe() -> Self {
        Self {
            safe: true,
            reason: None,
            bypassed_by_user: false,
        }
    }

    fn bypassed() -> Self {
        Self {
            safe: true,
            reason: None,
            bypassed_by_user: true,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: Some(reason.into()),
            bypassed_by_user: false,
        }
    }
}

/// Check whether `url` may be used as a profile base URL
///
/// Never panics. Non-http(s) schemes and unparseable URLs are always rejected;
/// `allow_internal_urls` only lifts hostname rejections.
pub fn validate_base_url_ssrf(url: &str, allow_internal_urls: bool) -> SsrfCheck {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => return SsrfCheck::rejected(format!("Invalid URL: {}", e)),
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return SsrfCheck::rejected(format!(
            "Only http and https URLs are allowed, got '{}'",
            parsed.scheme()
        ));
    }

    let Some(host) = parsed.host_str() else {
        return SsrfCheck::rejected("Invalid URL: missing hostname");
    };

    let hostname = host.to_lowercase();
    let bare = hostname.trim_start_matches('[').trim_end_matches(']');

    for (pattern, label) in INTERNAL_HOST_PATTERNS.iter() {
        if pattern.is_match(bare) {
            if allow_internal_urls {
                return SsrfCheck::bypassed();
            }
            return SsrfCheck::rejected(format!(
                "Hostname '{}' resolves to a {} address; enable allowInternalUrls to use it",
                hostname, label
            ));
        }
    }

    SsrfCheck::safe()
}
