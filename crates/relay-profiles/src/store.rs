//! Settings store collaborator: the only source of truth for profiles

use anyhow::{Context, Result};
use async_trait::async_trait;
use relay_protocol::ProviderProfile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::atomic_write::atomic_write_secure;

/// Global settings document
///
/// Only `providerProfiles` is interpreted; every other key is carried through
/// unchanged on write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default)]
    pub provider_profiles: Vec<ProviderProfile>,

    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

/// Partial update for [`SettingsStore::update_global_settings`]
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub provider_profiles: Option<Vec<ProviderProfile>>,
}

impl SettingsUpdate {
    pub fn profiles(profiles: Vec<ProviderProfile>) -> Self {
        Self {
            provider_profiles: Some(profiles),
        }
    }

    fn apply(self, settings: &mut GlobalSettings) {
        if let Some(profiles) = self.provider_profiles {
            settings.provider_profiles = profiles;
        }
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_global_settings(&self) -> Result<GlobalSettings>;

    async fn update_global_settings(&self, update: SettingsUpdate) -> Result<()>;
}

/// JSON settings file, re-read on every call
pub struct JsonFileSettingsStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<GlobalSettings> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(GlobalSettings::default())
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read settings: {}", self.path.display()))
            }
        };

        if content.trim().is_empty() {
            return Ok(GlobalSettings::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", self.path.display()))
    }
}

#[async_trait]
impl SettingsStore for JsonFileSettingsStore {
    async fn get_global_settings(&self) -> Result<GlobalSettings> {
        self.read().await
    }

    async fn update_global_settings(&self, update: SettingsUpdate) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut settings = self.read().await?;
        update.apply(&mut settings);
        let content = serde_json::to_vec_pretty(&settings).context("Failed to serialize settings")?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write_secure(&path, &content))
            .await
            .context("Settings write task failed")?
            .with_context(|| format!("Failed to write settings: {}", self.path.display()))?;

        debug!(path = %self.path.display(), "settings written");
        Ok(())
    }
}

/// In-memory store for tests and embedding
#[derive(Default)]
pub struct MemorySettingsStore {
    settings: Mutex<GlobalSettings>,
}

impl MemorySettingsStore {
    pub fn new(settings: GlobalSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    pub fn with_profiles(profiles: Vec<ProviderProfile>) -> Self {
        Self::new(GlobalSettings {
            provider_profiles: profiles,
            ..Default::default()
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GlobalSettings> {
        self.settings
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_global_settings(&self) -> Result<GlobalSettings> {
        Ok(self.lock().clone())
    }

    async fn update_global_settings(&self, update: SettingsUpdate) -> Result<()> {
        update.apply(&mut self.lock());
        Ok(())
    }
}
