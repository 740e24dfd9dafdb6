//! Provider registry: name to factory, model predicate, aliases, and priority
//!
//! The registry is an explicit object built once at startup and shared by
//! handle. Ordering is recomputed on every lookup, so a re-registration takes
//! effect on the next call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::provider::{Provider, DEFAULT_PROVIDER_NAME};
use crate::traits::{AgentSdk, ModelResult};
use crate::ProviderError;

pub type ProviderFactory = Arc<dyn Fn() -> ModelResult<Provider> + Send + Sync>;

/// Receives the lower-cased model id
pub type ModelPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Registration input for [`ProviderRegistry::register`]
#[derive(Clone)]
pub struct RegistrationOptions {
    factory: ProviderFactory,
    aliases: Vec<String>,
    can_handle_model: Option<ModelPredicate>,
    priority: i32,
}

impl RegistrationOptions {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> ModelResult<Provider> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            aliases: Vec::new(),
            can_handle_model: None,
            priority: 0,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.can_handle_model = Some(Arc::new(predicate));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// One registered provider
#[derive(Clone)]
pub struct ProviderRegistration {
    pub name: String,
    pub aliases: Vec<String>,
    pub priority: i32,
    factory: ProviderFactory,
    can_handle_model: Option<ModelPredicate>,
    /// First-registration order; breaks priority ties
    sequence: u64,
}

impl ProviderRegistration {
    pub fn can_handle(&self, model_id_lower: &str) -> bool {
        self.can_handle_model
            .as_ref()
            .is_some_and(|predicate| predicate(model_id_lower))
    }

    pub fn create(&self) -> ModelResult<Provider> {
        (self.factory)()
    }
}

impl std::fmt::Debug for ProviderRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistration")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("priority", &self.priority)
            .field("has_predicate", &self.can_handle_model.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct ProviderRegistry {
    entries: RwLock<HashMap<String, ProviderRegistration>>,
    next_sequence: AtomicU64,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ProviderRegistration>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ProviderRegistration>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the registration for `name`
    ///
    /// An overwritten entry keeps its original position among equal priorities.
    pub fn register(&self, name: impl Into<String>, options: RegistrationOptions) {
        let name = name.into();
        let mut entries = self.write();
        let sequence = entries
            .get(&name)
            .map(|existing| existing.sequence)
            .unwrap_or_else(|| self.next_sequence.fetch_add(1, Ordering::Relaxed));

        let replaced = entries
            .insert(
                name.clone(),
                ProviderRegistration {
                    name: name.clone(),
                    aliases: options.aliases,
                    priority: options.priority,
                    factory: options.factory,
                    can_handle_model: options.can_handle_model,
                    sequence,
                },
            )
            .is_some();

        info!(provider = %name, priority = options.priority, replaced, "registered provider");
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    /// Look up by name, then by alias
    pub fn get(&self, name: &str) -> Option<ProviderRegistration> {
        let entries = self.read();
        entries.get(name).cloned().or_else(|| {
            entries
                .values()
                .find(|r| r.aliases.iter().any(|a| a == name))
                .cloned()
        })
    }

    /// Registrations by priority descending, ties in registration order
    pub fn registrations(&self) -> Vec<ProviderRegistration> {
        let mut sorted: Vec<_> = self.read().values().cloned().collect();
        sorted.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.sequence.cmp(&b.sequence))
        });
        sorted
    }

    pub fn names(&self) -> Vec<String> {
        self.registrations().into_iter().map(|r| r.name).collect()
    }

    /// Pick a provider name for `model_id`
    ///
    /// Predicates are consulted first, then the `<name>-` prefix convention,
    /// then the `claude` default.
    pub fn resolve_provider_name(&self, model_id: &str) -> String {
        let ordered = self.registrations();
        let lower = model_id.to_lowercase();

        if let Some(hit) = ordered.iter().find(|r| r.can_handle(&lower)) {
            return hit.name.clone();
        }

        if let Some(hit) = ordered
            .iter()
            .find(|r| model_id.starts_with(&format!("{}-", r.name)))
        {
            return hit.name.clone();
        }

        DEFAULT_PROVIDER_NAME.to_string()
    }

    /// Resolve and instantiate a provider for `model_id`
    pub fn resolve_provider(&self, model_id: &str) -> ModelResult<Provider> {
        let name = self.resolve_provider_name(model_id);
        let registration = self
            .get(&name)
            .or_else(|| self.get(DEFAULT_PROVIDER_NAME))
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "no provider registered for model '{model_id}' (resolved '{name}')"
                ))
            })?;

        debug!(model = %model_id, provider = %registration.name, "resolved provider");
        registration.create()
    }
}

/// Claude-family model ids
pub fn is_claude_model(model_id_lower: &str) -> bool {
    ["claude", "sonnet", "opus", "haiku"]
        .iter()
        .any(|family| model_id_lower.contains(family))
}

/// Registry with the default `claude` provider registered
pub fn default_registry(sdk: Arc<dyn AgentSdk>) -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    registry.register(
        DEFAULT_PROVIDER_NAME,
        RegistrationOptions::new(move || Ok(Provider::claude(sdk.clone())))
            .with_aliases(["anthropic"])
            .with_predicate(is_claude_model),
    );
    registry
}
