//! CLI configuration

use anyhow::Result;
use relay_profiles::{resolve_config, RelayConfig};
use relay_telemetry::TelemetryConfig;
use std::path::{Path, PathBuf};

/// Workspace config plus command-line overrides
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub relay: RelayConfig,
    /// File the config was read from, if any
    pub source: Option<PathBuf>,
    pub settings_path: PathBuf,
}

impl CliConfig {
    /// Resolve the workspace config; `--settings` wins over `settings_path`
    pub fn load(config_path: Option<&Path>, settings_override: Option<&Path>) -> Result<Self> {
        let resolved = resolve_config(config_path)?;
        let settings_path = match settings_override {
            Some(path) => path.to_path_buf(),
            None => resolved.config.resolved_settings_path(),
        };

        Ok(Self {
            relay: resolved.config,
            source: resolved.path,
            settings_path,
        })
    }

    pub fn telemetry(&self, verbose: bool) -> TelemetryConfig {
        let level = if verbose {
            "debug".to_string()
        } else {
            self.relay.telemetry.level.clone()
        };
        TelemetryConfig::new(level, self.relay.telemetry.json)
    }

    pub fn fallback_enabled(&self) -> bool {
        self.relay.fallback.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_settings_override_wins() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("relay.json");
        std::fs::write(
            &config_path,
            r#"{"settings_path":"/tmp/from-config.json","fallback":{"enabled":false}}"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&config_path), None).unwrap();
        assert_eq!(config.settings_path, PathBuf::from("/tmp/from-config.json"));
        assert!(!config.fallback_enabled());
        assert_eq!(config.source.as_deref(), Some(config_path.as_path()));

        let override_path = dir.path().join("settings.json");
        let config = CliConfig::load(Some(&config_path), Some(&override_path)).unwrap();
        assert_eq!(config.settings_path, override_path);
    }

    #[test]
    fn test_verbose_forces_debug() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("relay.yml");
        std::fs::write(&config_path, "telemetry:\n  level: warn\n  json: true\n").unwrap();

        let config = CliConfig::load(Some(&config_path), None).unwrap();
        assert_eq!(config.telemetry(false).level, "warn");
        assert_eq!(config.telemetry(true).level, "debug");
        assert!(config.telemetry(true).json_output);
    }
}
