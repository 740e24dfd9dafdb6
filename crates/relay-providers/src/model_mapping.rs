//! Per-profile model alias lookup
//!
//! Matching is case-insensitive and the first matching row wins. Duplicate
//! local names are not rejected, so the round trip
//! `map_model_from_remote(map_model_to_remote(m))` only holds for names that
//! appear once in the table.

use relay_protocol::ProviderProfile;

/// Resolve the name the remote endpoint expects for `local_model`
pub fn map_model_to_remote(local_model: &str, profile: &ProviderProfile) -> String {
    profile
        .model_mapping
        .iter()
        .find(|entry| entry.local_model.eq_ignore_ascii_case(local_model))
        .map(|entry| entry.remote_model.clone())
        .unwrap_or_else(|| local_model.to_string())
}

/// Resolve the local alias for a name reported by the remote endpoint
pub fn map_model_from_remote(remote_model: &str, profile: &ProviderProfile) -> String {
    profile
        .model_mapping
        .iter()
        .find(|entry| entry.remote_model.eq_ignore_ascii_case(remote_model))
        .map(|entry| entry.local_model.clone())
        .unwrap_or_else(|| remote_model.to_string())
}
