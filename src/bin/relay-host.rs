//! Relay Host CLI Binary
//!
//! Runs a single operation through a mounted query host, optionally refreshing
//! the environment and re-running it.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use relay_host::config::{ConfigLoader, HostConfig};
use relay_host::error::ProviderError;
use relay_host::fetch::{CachedNetwork, HttpNetwork, Network};
use relay_host::logging::init_logging;
use relay_host::{
    EnvironmentFactory, EnvironmentHandle, NetworkQueryEngine, Props, QueryDescriptor,
    RenderSpec, Variables,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Read on every provider call, so a refresh picks up a rotated token
const TOKEN_VAR: &str = "RELAY_HOST_TOKEN";

#[derive(Parser, Debug)]
#[command(name = "relay-host", version, about = "Run GraphQL operations through a query host")]
struct Cli {
    /// Explicit configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a query and print the rendered result
    Query {
        /// Query text, or @path to read it from a file
        #[arg(long)]
        query: String,

        /// Operation name used in logs
        #[arg(long, default_value = "CliQuery")]
        name: String,

        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,

        /// Refresh the environment this many milliseconds after the first
        /// result and run again
        #[arg(long, value_name = "MS")]
        refresh_after_ms: Option<u64>,
    },
    /// Print the resolved configuration as TOML
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(Some(&config.logging)) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<HostConfig> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let config = ConfigLoader::load_with(Some(&cwd), cli.config.as_deref())?;
    Ok(config)
}

fn run(command: Command, config: HostConfig) -> anyhow::Result<()> {
    match command {
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Query {
            query,
            name,
            variables,
            refresh_after_ms,
        } => {
            let text = match query.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read query file {}", path))?,
                None => query,
            };
            let variables = parse_variables(variables.as_deref())?;
            let descriptor = QueryDescriptor::query(name, text).with_variables(variables);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(execute(config, descriptor, refresh_after_ms))
        }
    }
}

fn parse_variables(raw: Option<&str>) -> anyhow::Result<Variables> {
    let Some(raw) = raw else {
        return Ok(Variables::new());
    };
    match serde_json::from_str(raw).context("Variables must be valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("Variables must be a JSON object, got {}", other),
    }
}

fn environment_provider(
    config: HostConfig,
) -> impl Fn() -> Result<EnvironmentHandle, ProviderError> + Send + Sync {
    let counter = AtomicU64::new(0);
    move || {
        let mut fetch = config.fetch.clone();
        if let Ok(token) = std::env::var(TOKEN_VAR) {
            fetch
                .headers
                .insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        let http = HttpNetwork::new(fetch)?;
        let network: Arc<dyn Network> = if config.cache.enabled {
            Arc::new(CachedNetwork::new(http, config.cache.clone()))
        } else {
            Arc::new(http)
        };
        let n = counter.fetch_add(1, Ordering::Relaxed);
        Ok(EnvironmentHandle::new(format!("http-{}", n), network))
    }
}

async fn execute(
    config: HostConfig,
    descriptor: QueryDescriptor,
    refresh_after_ms: Option<u64>,
) -> anyhow::Result<()> {
    let factory = EnvironmentFactory::new(environment_provider(config))?;

    let spec: RenderSpec<String> = RenderSpec::new()
        .with_success(|props: &Props| {
            serde_json::to_string_pretty(props).unwrap_or_else(|e| format!("<unprintable: {}>", e))
        })
        .with_error(|args| format!("error: {}", args.error));
    let host = factory.create_host(Arc::new(NetworkQueryEngine::new()), descriptor, spec);

    host.mount()?;
    print_rendered(host.settled().await);

    if let Some(delay) = refresh_after_ms {
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let environment = factory.refresh()?;
        info!(environment = %environment.id(), "Re-running after refresh");
        print_rendered(host.settled().await);
    }

    host.unmount();
    Ok(())
}

fn print_rendered(rendered: Option<String>) {
    match rendered {
        Some(output) => println!("{}", output),
        None => println!("(nothing rendered)"),
    }
}
