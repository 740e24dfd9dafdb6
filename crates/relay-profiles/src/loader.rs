use crate::schema::RelayConfig;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Jsonc,
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "jsonc" => Some(Self::Jsonc),
            "json" => Some(Self::Json),
            "yml" | "yaml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: RelayConfig,
    /// `None` when no file was found and defaults were used
    pub path: Option<PathBuf>,
}

const CONFIG_CANDIDATES: &[&str] = &[
    "relay.jsonc",
    "relay.json",
    "relay.yml",
    "relay.yaml",
    ".relay.jsonc",
    ".relay.json",
    ".relay.yml",
    ".relay.yaml",
];

/// Load an explicit file, or the first candidate found, or defaults
pub fn resolve_config(config_path: Option<&Path>) -> Result<ResolvedConfig> {
    if let Some(path) = config_path {
        return load_config_from_file(path);
    }

    match find_config_file() {
        Some(path) => load_config_from_file(&path),
        None => {
            debug!("no relay config file found, using defaults");
            Ok(ResolvedConfig {
                config: RelayConfig::default(),
                path: None,
            })
        }
    }
}

pub fn load_config_from_file(path: &Path) -> Result<ResolvedConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let format = ConfigFormat::from_path(path)
        .ok_or_else(|| anyhow!("Unknown config format for: {}", path.display()))?;

    let mut config = parse_config_content(&content, format)?;
    config.settings_path = config.settings_path.as_deref().map(expand_env_string);

    debug!(path = %path.display(), ?format, "loaded relay config");
    Ok(ResolvedConfig {
        config,
        path: Some(path.to_path_buf()),
    })
}

fn parse_config_content(content: &str, format: ConfigFormat) -> Result<RelayConfig> {
    match format {
        ConfigFormat::Jsonc => json5::from_str(content).context("Failed to parse JSONC"),
        ConfigFormat::Json => serde_json::from_str(content).context("Failed to parse JSON"),
        ConfigFormat::Yaml => serde_yaml_ng::from_str(content).context("Failed to parse YAML"),
    }
}

fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::new()];
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".config").join("relay"));
    }
    dirs
}

fn find_config_file() -> Option<PathBuf> {
    candidate_dirs().into_iter().find_map(|dir| {
        CONFIG_CANDIDATES
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.exists())
    })
}

/// Expand `${VAR}` references; unknown variables are left as written
fn expand_env_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match env::var(name) {
                    Ok(value) => result.push_str(&value),
                    Err(_) => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}
