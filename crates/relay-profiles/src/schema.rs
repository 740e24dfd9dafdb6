use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Workspace configuration for the relay
///
/// Loaded from (in priority order):
/// 1. `relay.jsonc` - JSON with comments
/// 2. `relay.json` - Standard JSON
/// 3. `relay.yml` / `relay.yaml` - YAML format
///
/// Hidden variants (`.relay.*`) and `~/.config/relay/` are checked too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Global settings file holding provider profiles.
    /// Supports `${VAR}` expansion. Default: `~/.config/relay/settings.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<String>,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    /// Model used when a query does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default)]
    pub fallback: FallbackSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            settings_path: None,
            telemetry: TelemetrySettings::default(),
            default_model: default_model(),
            fallback: FallbackSettings::default(),
        }
    }
}

impl RelayConfig {
    pub fn resolved_settings_path(&self) -> PathBuf {
        match &self.settings_path {
            Some(path) => PathBuf::from(path),
            None => default_settings_path(),
        }
    }
}

/// Logging output settings
///
/// ```yaml
/// telemetry:
///   level: debug
///   json: true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackSettings {
    /// When false only the first provider of the chain is tried
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

pub fn default_settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("relay")
        .join("settings.json")
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: RelayConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.default_model, "claude-sonnet-4-5");
        assert!(config.fallback.enabled);
        assert_eq!(config.telemetry.level, "info");
        assert!(config
            .resolved_settings_path()
            .ends_with(".config/relay/settings.json"));
    }

    #[test]
    fn test_explicit_settings_path() {
        let config: RelayConfig =
            serde_yaml_ng::from_str("settings_path: /tmp/relay-settings.json\nfallback:\n  enabled: false\n")
                .unwrap();
        assert_eq!(
            config.resolved_settings_path(),
            PathBuf::from("/tmp/relay-settings.json")
        );
        assert!(!config.fallback.enabled);
    }
}
