//! Relay - provider profiles and fallback routing from the command line

use anyhow::{anyhow, Result};
use clap::Parser;
use colored::Colorize;
use relay_cli::commands::{AddProfileArgs, QueryArgs};
use relay_cli::{Cli, CliConfig, Commands, ProfileCommands};
use relay_profiles::{JsonFileSettingsStore, NewProfile, ProfileService};
use relay_protocol::{ConnectionTestResult, ProviderProfile, StreamEvent, DEFAULT_PROFILE_TIMEOUT_MS};
use relay_providers::{
    default_registry, AgentSdk, CancellationToken, EventStream, FallbackExecutor,
    HttpClientBuilder, MessagesApiSdk, QueryRequest,
};
use reqwest::Client;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match CliConfig::load(cli.config.as_deref(), cli.settings.as_deref()) {
        Ok(config) => {
            if let Err(e) = relay_telemetry::init_subscriber(&config.telemetry(cli.verbose)) {
                eprintln!("{}: {}", "Warning".yellow().bold(), e);
            }
            run(&cli, &config).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, config: &CliConfig) -> Result<()> {
    debug!(
        source = ?config.source,
        settings = %config.settings_path.display(),
        "resolved relay config"
    );
    let client = HttpClientBuilder::new().build()?;
    let service = ProfileService::new(
        Arc::new(JsonFileSettingsStore::new(&config.settings_path)),
        client.clone(),
    );

    match &cli.command {
        Commands::Query(args) => run_query(config, &service, client, args).await,
        Commands::Route { model } => run_route(&service, client, model).await,
        Commands::Profiles { command } => run_profiles(&service, command).await,
    }
}

fn executor(client: Client) -> FallbackExecutor {
    let sdk: Arc<dyn AgentSdk> = Arc::new(MessagesApiSdk::new(client.clone()));
    FallbackExecutor::new(Arc::new(default_registry(sdk.clone())), sdk, client)
}

async fn run_query(
    config: &CliConfig,
    service: &ProfileService,
    client: Client,
    args: &QueryArgs,
) -> Result<()> {
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| config.relay.default_model.clone());
    let profiles = service.active_profiles().await?;
    let executor = executor(client);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut request = QueryRequest::new(model.as_str(), args.prompt.as_str()).with_cancel(cancel);
    if let Some(system) = &args.system {
        request = request.with_system_prompt(system);
    }

    let stream = if args.no_fallback || !config.fallback_enabled() {
        let provider = executor
            .build_fallback_chain(&model, &profiles)?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no provider for model {}", model))?;
        provider.stream_query(&request).await?
    } else {
        executor.stream_with_fallback(&request, &profiles).await?
    };

    print_stream(stream, args.json).await
}

async fn print_stream(mut stream: EventStream, json: bool) -> Result<()> {
    let mut stdout = std::io::stdout();

    while let Some(item) = stream.next_event().await {
        let event = item?;
        if json {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
            continue;
        }

        match &event {
            StreamEvent::AssistantTextDelta { text, .. } => {
                write!(stdout, "{}", text)?;
                stdout.flush()?;
            }
            StreamEvent::AssistantToolCall { name, input, .. } => {
                eprintln!("{} {} {}", "tool".magenta().bold(), name.cyan(), input.to_string().dimmed());
            }
            StreamEvent::Result { .. } => {
                writeln!(stdout)?;
            }
            StreamEvent::Error { message, .. } => {
                return Err(anyhow!("{}", message));
            }
        }
    }

    Ok(())
}

async fn run_route(service: &ProfileService, client: Client, model: &str) -> Result<()> {
    let profiles = service.active_profiles().await?;
    let executor = executor(client);
    let chain = executor.build_fallback_chain(model, &profiles)?;

    println!("{} {}", "Route for".cyan().bold(), model.yellow());
    for (index, provider) in chain.iter().enumerate() {
        let remote = provider
            .profile()
            .map(|p| relay_providers::map_model_to_remote(model, p))
            .unwrap_or_else(|| model.to_string());
        println!("  {}. {} {}", index + 1, provider.name().green(), format!("-> {}", remote).dimmed());
    }
    Ok(())
}

async fn run_profiles(service: &ProfileService, command: &ProfileCommands) -> Result<()> {
    match command {
        ProfileCommands::List { json } => {
            let profiles = service.list_profiles().await?;
            if *json {
                let redacted: Vec<_> = profiles.iter().map(redacted_json).collect();
                println!("{}", serde_json::to_string_pretty(&redacted)?);
            } else if profiles.is_empty() {
                println!("{}", "No provider profiles configured.".dimmed());
            } else {
                for profile in &profiles {
                    print_profile(profile);
                }
            }
        }
        ProfileCommands::Add(args) => {
            let profile = service.create_profile(new_profile(args)).await?;
            println!("{} {} ({})", "Created:".green().bold(), profile.name, profile.id.yellow());
        }
        ProfileCommands::Remove { id } => {
            service.delete_profile(id).await?;
            println!("{} {}", "Removed:".green().bold(), id.yellow());
        }
        ProfileCommands::Enable { id } => {
            let profile = service.set_active(id, true).await?;
            println!("{} {}", "Enabled:".green().bold(), profile.name);
        }
        ProfileCommands::Disable { id } => {
            let profile = service.set_active(id, false).await?;
            println!("{} {}", "Disabled:".green().bold(), profile.name);
        }
        ProfileCommands::Reorder { ids } => {
            for profile in service.reorder_profiles(ids).await? {
                print_profile(&profile);
            }
        }
        ProfileCommands::Test { id } => {
            let result = service.test_profile(id).await?;
            print_test_result(&result);
            if !result.success {
                return Err(anyhow!("connection test failed"));
            }
        }
    }
    Ok(())
}

fn new_profile(args: &AddProfileArgs) -> NewProfile {
    let mut input = NewProfile::new(
        args.name.as_str(),
        args.profile_type,
        args.base_url.as_str(),
        args.api_key.as_str(),
    );
    input.model_mapping = args.mappings.clone();
    input.priority = args.priority;
    input.timeout = args.timeout.unwrap_or(DEFAULT_PROFILE_TIMEOUT_MS);
    input.allow_internal_urls = args.allow_internal_urls;
    input.is_active = !args.inactive;
    input
}

fn redacted_json(profile: &ProviderProfile) -> serde_json::Value {
    let mut value = serde_json::to_value(profile).unwrap_or_default();
    if let Some(key) = value.get_mut("apiKey") {
        *key = serde_json::Value::String("***".to_string());
    }
    value
}

fn print_profile(profile: &ProviderProfile) {
    let state = if profile.is_active {
        "active".green()
    } else {
        "inactive".dimmed()
    };
    println!(
        "{} {} [{}] {} priority={} {}",
        profile.id.yellow(),
        profile.name.bold(),
        profile.profile_type.to_string().cyan(),
        profile.trimmed_base_url(),
        profile.priority,
        state
    );
    for entry in &profile.model_mapping {
        println!("    {} -> {}", entry.local_model, entry.remote_model.dimmed());
    }
}

fn print_test_result(result: &ConnectionTestResult) {
    if result.success {
        println!("{} {}ms", "✓ reachable".green().bold(), result.response_time_ms);
        if let Some(models) = &result.available_models {
            println!("{} {}", "Models:".cyan(), models.join(", "));
        }
    } else {
        println!(
            "{} {}",
            "✗ failed".red().bold(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}
