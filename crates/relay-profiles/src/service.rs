//! Profile CRUD and priority ordering over a [`SettingsStore`]
//!
//! Nothing is cached: every operation reads the store, so concurrent writers
//! in other processes never leave a stale priority order behind. Writes made
//! through one service are serialized over the whole load-then-save.

use relay_protocol::{
    ConnectionTestResult, ModelMappingEntry, ProfileType, ProviderProfile,
    DEFAULT_PROFILE_TIMEOUT_MS,
};
use relay_providers::{test_connection, validate_base_url_ssrf, ProviderError};
use reqwest::Client;
use secrecy::SecretString;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::{SettingsStore, SettingsUpdate};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile not found: {0}")]
    NotFound(String),

    #[error("invalid profile: {0}")]
    Invalid(String),

    #[error("base URL rejected: {0}")]
    UnsafeUrl(String),

    #[error("settings store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<ProfileError> for ProviderError {
    fn from(err: ProfileError) -> Self {
        ProviderError::Configuration(err.to_string())
    }
}

pub type ProfileResult<T> = Result<T, ProfileError>;

/// Input for [`ProfileService::create_profile`]
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub profile_type: ProfileType,
    pub base_url: String,
    pub api_key: SecretString,
    pub model_mapping: Vec<ModelMappingEntry>,
    pub is_active: bool,
    pub priority: i32,
    pub timeout: u64,
    pub allow_internal_urls: bool,
    pub rate_limit_rpm: u32,
}

impl NewProfile {
    pub fn new(
        name: impl Into<String>,
        profile_type: ProfileType,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
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
        }
    }
}

/// Partial update for [`ProfileService::update_profile`]; `None` keeps a field
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub profile_type: Option<ProfileType>,
    pub base_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub model_mapping: Option<Vec<ModelMappingEntry>>,
    pub is_active: Option<bool>,
    pub priority: Option<i32>,
    pub timeout: Option<u64>,
    pub allow_internal_urls: Option<bool>,
    pub rate_limit_rpm: Option<u32>,
}

pub struct ProfileService {
    store: Arc<dyn SettingsStore>,
    client: Client,
    write_lock: Mutex<()>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn SettingsStore>, client: Client) -> Self {
        Self {
            store,
            client,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> ProfileResult<Vec<ProviderProfile>> {
        Ok(self.store.get_global_settings().await?.provider_profiles)
    }

    async fn save(&self, profiles: Vec<ProviderProfile>) -> ProfileResult<()> {
        self.store
            .update_global_settings(SettingsUpdate::profiles(profiles))
            .await?;
        Ok(())
    }

    /// All profiles, highest priority first; ties keep stored order
    pub async fn list_profiles(&self) -> ProfileResult<Vec<ProviderProfile>> {
        let mut profiles = self.load().await?;
        profiles.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(profiles)
    }

    pub async fn active_profiles(&self) -> ProfileResult<Vec<ProviderProfile>> {
        Ok(self
            .list_profiles()
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .collect())
    }

    pub async fn get_profile(&self, id: &str) -> ProfileResult<ProviderProfile> {
        self.load()
            .await?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ProfileError::NotFound(id.to_string()))
    }

    pub async fn create_profile(&self, input: NewProfile) -> ProfileResult<ProviderProfile> {
        let profile = ProviderProfile {
            id: Uuid::new_v4().to_string(),
            name: input.name.trim().to_string(),
            profile_type: input.profile_type,
            base_url: input.base_url.trim().to_string(),
            api_key: input.api_key,
            model_mapping: input.model_mapping,
            is_active: input.is_active,
            priority: input.priority,
            timeout: input.timeout,
            allow_internal_urls: input.allow_internal_urls,
            rate_limit_rpm: input.rate_limit_rpm,
            last_connection_test: None,
        };
        validate_profile(&profile, true)?;

        let _guard = self.write_lock.lock().await;
        let mut profiles = self.load().await?;
        profiles.push(profile.clone());
        self.save(profiles).await?;

        info!(profile_id = %profile.id, name = %profile.name, profile_type = %profile.profile_type, "created profile");
        Ok(profile)
    }

    pub async fn update_profile(&self, id: &str, patch: ProfilePatch) -> ProfileResult<ProviderProfile> {
        let _guard = self.write_lock.lock().await;
        let mut profiles = self.load().await?;
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ProfileError::NotFound(id.to_string()))?;

        let recheck_url = patch.base_url.is_some() || patch.allow_internal_urls.is_some();

        if let Some(name) = patch.name {
            profile.name = name.trim().to_string();
        }
        if let Some(profile_type) = patch.profile_type {
            profile.profile_type = profile_type;
        }
        if let Some(base_url) = patch.base_url {
            profile.base_url = base_url.trim().to_string();
        }
        if let Some(api_key) = patch.api_key {
            profile.api_key = api_key;
        }
        if let Some(mapping) = patch.model_mapping {
            profile.model_mapping = mapping;
        }
        if let Some(is_active) = patch.is_active {
            profile.is_active = is_active;
        }
        if let Some(priority) = patch.priority {
            profile.priority = priority;
        }
        if let Some(timeout) = patch.timeout {
            profile.timeout = timeout;
        }
        if let Some(allow) = patch.allow_internal_urls {
            profile.allow_internal_urls = allow;
        }
        if let Some(rpm) = patch.rate_limit_rpm {
            profile.rate_limit_rpm = rpm;
        }

        validate_profile(profile, recheck_url)?;
        let updated = profile.clone();
        self.save(profiles).await?;

        info!(profile_id = %id, "updated profile");
        Ok(updated)
    }

    pub async fn delete_profile(&self, id: &str) -> ProfileResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut profiles = self.load().await?;
        let before = profiles.len();
        profiles.retain(|p| p.id != id);
        if profiles.len() == before {
            return Err(ProfileError::NotFound(id.to_string()));
        }
        self.save(profiles).await?;
        info!(profile_id = %id, "deleted profile");
        Ok(())
    }

    pub async fn set_active(&self, id: &str, is_active: bool) -> ProfileResult<ProviderProfile> {
        self.update_profile(
            id,
            ProfilePatch {
                is_active: Some(is_active),
                ..Default::default()
            },
        )
        .await
    }

    /// Give `ids` descending priorities in the order listed
    ///
    /// The first id gets `ids.len()`, the last gets 1. Unlisted profiles keep
    /// their priority.
    pub async fn reorder_profiles(&self, ids: &[String]) -> ProfileResult<Vec<ProviderProfile>> {
        let guard = self.write_lock.lock().await;
        let mut profiles = self.load().await?;
        if let Some(missing) = ids.iter().find(|id| !profiles.iter().any(|p| &p.id == *id)) {
            return Err(ProfileError::NotFound(missing.clone()));
        }

        let total = ids.len() as i32;
        for profile in profiles.iter_mut() {
            if let Some(position) = ids.iter().position(|id| *id == profile.id) {
                profile.priority = total - position as i32;
            }
        }
        self.save(profiles).await?;
        drop(guard);

        info!(count = ids.len(), "reordered profiles");
        self.list_profiles().await
    }

    pub async fn record_connection_test(
        &self,
        id: &str,
        result: ConnectionTestResult,
    ) -> ProfileResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut profiles = self.load().await?;
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ProfileError::NotFound(id.to_string()))?;
        profile.last_connection_test = Some(result);
        self.save(profiles).await
    }

    /// Test the profile's endpoint and cache the result on the profile
    pub async fn test_profile(&self, id: &str) -> ProfileResult<ConnectionTestResult> {
        let profile = self.get_profile(id).await?;
        let result = test_connection(&self.client, &profile).await;
        self.record_connection_test(id, result.clone()).await?;
        Ok(result)
    }
}

fn validate_profile(profile: &ProviderProfile, check_url: bool) -> ProfileResult<()> {
    if profile.name.is_empty() {
        return Err(ProfileError::Invalid("name must not be empty".to_string()));
    }
    if profile.timeout == 0 {
        return Err(ProfileError::Invalid(
            "timeout must be greater than zero".to_string(),
        ));
    }
    if check_url {
        let check = validate_base_url_ssrf(&profile.base_url, profile.allow_internal_urls);
        if !check.safe {
            return Err(ProfileError::UnsafeUrl(
                check.reason.unwrap_or_else(|| profile.base_url.clone()),
            ));
        }
        if check.bypassed_by_user {
            warn!(
                profile = %profile.name,
                base_url = %profile.base_url,
                "internal base URL allowed by allowInternalUrls"
            );
        }
    }
    Ok(())
}
