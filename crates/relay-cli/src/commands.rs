//! CLI commands

use clap::{Args, Parser, Subcommand};
use relay_protocol::{ModelMappingEntry, ProfileType};
use std::path::PathBuf;

/// Relay - route model queries across provider profiles
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Workspace config file (relay.jsonc, relay.json, relay.yml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Settings file holding provider profiles
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a prompt and stream the reply
    Query(QueryArgs),

    /// Show the provider chain a model would be routed through
    Route {
        /// Model identifier
        model: String,
    },

    /// Provider profile management
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// The prompt to send
    pub prompt: String,

    /// Model to use (defaults to the configured default_model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Only try the first provider of the chain
    #[arg(long)]
    pub no_fallback: bool,

    /// Print every event as a JSON line
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// List profiles in priority order
    List {
        /// Output as JSON (API keys are redacted)
        #[arg(long)]
        json: bool,
    },

    /// Create a profile
    Add(AddProfileArgs),

    /// Delete a profile
    Remove { id: String },

    /// Mark a profile active
    Enable { id: String },

    /// Mark a profile inactive
    Disable { id: String },

    /// Reassign priorities; the first id is tried first
    Reorder {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Check that a profile's endpoint is reachable and the key is accepted
    Test { id: String },
}

#[derive(Args, Debug)]
pub struct AddProfileArgs {
    /// Display name
    #[arg(long)]
    pub name: String,

    /// Wire protocol: anthropic-compatible or openai-compatible
    #[arg(long = "type", value_parser = parse_profile_type)]
    pub profile_type: ProfileType,

    #[arg(long)]
    pub base_url: String,

    #[arg(long)]
    pub api_key: String,

    /// Model alias as LOCAL=REMOTE; repeatable
    #[arg(long = "map", value_parser = parse_mapping)]
    pub mappings: Vec<ModelMappingEntry>,

    #[arg(long, default_value_t = 0)]
    pub priority: i32,

    /// Per-call timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Permit private, loopback and link-local hosts
    #[arg(long)]
    pub allow_internal_urls: bool,

    /// Create the profile disabled
    #[arg(long)]
    pub inactive: bool,
}

fn parse_profile_type(s: &str) -> Result<ProfileType, String> {
    s.parse()
}

fn parse_mapping(s: &str) -> Result<ModelMappingEntry, String> {
    match s.split_once('=') {
        Some((local, remote)) if !local.trim().is_empty() && !remote.trim().is_empty() => {
            Ok(ModelMappingEntry::new(local.trim(), remote.trim()))
        }
        _ => Err(format!("expected LOCAL=REMOTE, got '{}'", s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_mapping() {
        let entry = parse_mapping("sonnet = gpt-4o").unwrap();
        assert_eq!(entry.local_model, "sonnet");
        assert_eq!(entry.remote_model, "gpt-4o");
        assert!(parse_mapping("sonnet").is_err());
        assert!(parse_mapping("=gpt-4o").is_err());
    }

    #[test]
    fn test_parse_add_profile() {
        let cli = Cli::try_parse_from([
            "relay",
            "profiles",
            "add",
            "--name",
            "Proxy",
            "--type",
            "openai-compatible",
            "--base-url",
            "https://proxy.example.com",
            "--api-key",
            "sk-test",
            "--map",
            "gpt-4o=gpt-4o-2024-08-06",
            "--map",
            "o3=o3-mini",
        ])
        .unwrap();

        match cli.command {
            Commands::Profiles {
                command: ProfileCommands::Add(args),
            } => {
                assert_eq!(args.profile_type, ProfileType::OpenaiCompatible);
                assert_eq!(args.mappings.len(), 2);
                assert!(!args.inactive);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_profile_type_rejected() {
        let result = Cli::try_parse_from([
            "relay", "profiles", "add", "--name", "x", "--type", "gemini", "--base-url",
            "https://x.example.com", "--api-key", "k",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["relay", "route", "gpt-4o", "--settings", "/tmp/s.json", "-v"])
                .unwrap();
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/s.json")));
        assert!(cli.verbose);
    }
}
