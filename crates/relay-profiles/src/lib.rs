//! Relay Profiles - provider profile persistence and workspace configuration

mod atomic_write;
pub mod loader;
pub mod schema;
pub mod service;
pub mod store;

pub use atomic_write::atomic_write_secure;
pub use loader::{load_config_from_file, resolve_config, ConfigFormat, ResolvedConfig};
pub use schema::{default_settings_path, FallbackSettings, RelayConfig, TelemetrySettings};
pub use service::{NewProfile, ProfileError, ProfilePatch, ProfileResult, ProfileService};
pub use store::{
    GlobalSettings, JsonFileSettingsStore, MemorySettingsStore, SettingsStore, SettingsUpdate,
};
