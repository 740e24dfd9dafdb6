//! Provider profile records as stored in global settings

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DEFAULT_PROFILE_TIMEOUT_MS: u64 = 30_000;

/// Wire protocol spoken by a profile's endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileType {
    AnthropicCompatible,
    OpenaiCompatible,
}

impl ProfileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnthropicCompatible => "anthropic-compatible",
            Self::OpenaiCompatible => "openai-compatible",
        }
    }
}

impl std::fmt::Display for ProfileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProfileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anthropic-compatible" => Ok(Self::AnthropicCompatible),
            "openai-compatible" => Ok(Self::OpenaiCompatible),
            other => Err(format!("unknown profile type: {}", other)),
        }
    }
}

/// One alias row in a profile's model mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMappingEntry {
    pub local_model: String,
    pub remote_model: String,
}

impl ModelMappingEntry {
    pub fn new(local_model: impl Into<String>, remote_model: impl Into<String>) -> Self {
        Self {
            local_model: local_model.into(),
            remote_model: remote_model.into(),
        }
    }
}

/// Outcome of a one-shot endpoint diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_models: Option<Vec<String>>,
    pub tested_at: DateTime<Utc>,
}

/// A user-configured remote endpoint plus credentials and routing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub profile_type: ProfileType,
    pub base_url: String,
    #[serde(
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub api_key: SecretString,
    #[serde(default)]
    pub model_mapping: Vec<ModelMappingEntry>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Higher values are tried first
    #[serde(default)]
    pub priority: i32,
    /// Hard cap for one call, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default)]
    pub allow_internal_urls: bool,
    /// Advisory; 0 means unlimited
    #[serde(default)]
    pub rate_limit_rpm: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connection_test: Option<ConnectionTestResult>,
}

impl ProviderProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        profile_type: ProfileType,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            profile_type,
            base_url: base_url.into(),
            api_key: SecretString::from(api_key.into()),
            model_mapping: Vec::new(),
            is_active: true,
            priority: 0,
            timeout: DEFAULT_PROFILE_TIMEOUT_MS,
            allow_internal_urls: false,
            rate_limit_rpm: 0,
            last_connection_test: None,
        }
    }

    pub fn with_mapping(
        mut self,
        local_model: impl Into<String>,
        remote_model: impl Into<String>,
    ) -> Self {
        self.model_mapping
            .push(ModelMappingEntry::new(local_model, remote_model));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = timeout_ms;
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn with_allow_internal_urls(mut self, allow: bool) -> Self {
        self.allow_internal_urls = allow;
        self
    }

    /// Base URL with trailing slashes removed
    pub fn trimmed_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    DEFAULT_PROFILE_TIMEOUT_MS
}

fn serialize_secret<S>(secret: &SecretString, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_defaults_from_minimal_json() {
        let json = r#"{
            "id": "p1",
            "name": "Proxy",
            "type": "openai-compatible",
            "baseUrl": "https://proxy.example.com/",
            "apiKey": "sk-test"
        }"#;
        let profile: ProviderProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.profile_type, ProfileType::OpenaiCompatible);
        assert_eq!(profile.timeout, DEFAULT_PROFILE_TIMEOUT_MS);
        assert!(profile.is_active);
        assert!(!profile.allow_internal_urls);
        assert_eq!(profile.rate_limit_rpm, 0);
        assert_eq!(profile.trimmed_base_url(), "https://proxy.example.com");
        assert_eq!(profile.api_key.expose_secret(), "sk-test");
    }

    #[test]
    fn test_profile_serializes_camel_case_with_key() {
        let profile = ProviderProfile::new(
            "p1",
            "Proxy",
            ProfileType::AnthropicCompatible,
            "https://proxy.example.com",
            "secret",
        )
        .with_mapping("claude-sonnet", "remote-sonnet");
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["type"], "anthropic-compatible");
        assert_eq!(value["apiKey"], "secret");
        assert_eq!(value["modelMapping"][0]["localModel"], "claude-sonnet");
        assert_eq!(value["isActive"], true);
        assert!(value.get("lastConnectionTest").is_none());
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let profile = ProviderProfile::new(
            "p1",
            "Proxy",
            ProfileType::OpenaiCompatible,
            "https://proxy.example.com",
            "sk-very-secret",
        );
        assert!(!format!("{:?}", profile).contains("sk-very-secret"));
    }

    #[test]
    fn test_profile_type_parse() {
        assert_eq!(
            "openai-compatible".parse::<ProfileType>().unwrap(),
            ProfileType::OpenaiCompatible
        );
        assert!("gemini".parse::<ProfileType>().is_err());
    }
}
