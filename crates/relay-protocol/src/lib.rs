//! Relay Protocol - Shared data model for provider routing
//!
//! This crate defines the types exchanged between the Relay crates:
//! - Provider profiles and their model mapping tables
//! - The normalized stream event protocol every translator emits
//! - Prompt shapes accepted by the translators
//! - Connection diagnostics and provider capability descriptors

mod events;
mod profile;
mod prompt;
mod types;

pub use events::*;
pub use profile::*;
pub use prompt::*;
pub use types::*;
