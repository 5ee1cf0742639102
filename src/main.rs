//! Metadraft - autosave draft service CLI
//!
#![doc = "Metadraft - autosave draft service CLI"]
#![doc = "Main entry point for the Metadraft draft service."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use metadraft::cli::{Cli, Commands};
use metadraft::commands;
use metadraft::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration; warnings go through a bootstrap subscriber
    let config = load_config(&cli)?;

    // Initialize tracing
    init_tracing(&config, cli.verbose);

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!("Starting draft service");
            commands::serve::run_serve(config, bind).await?;
            Ok(())
        }
        Commands::Sweep => {
            tracing::info!("Running retention sweep");
            commands::sweep::run_sweep(&config)?;
            Ok(())
        }
        Commands::Inspect { session, payload } => {
            commands::inspect::handle_inspect(&config, &session, payload)?;
            Ok(())
        }
    }
}

/// Load the configuration file with env and CLI overrides
///
/// The configured log level is not known yet, so a stderr subscriber built
/// from `RUST_LOG`, `--verbose` and `--json-logs` is scoped to the load.
fn load_config(cli: &Cli) -> Result<Config> {
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let level = if cli.verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr);

    if cli.json_logs {
        tracing::subscriber::with_default(builder.json().finish(), || {
            Config::load(config_path, cli)
        })
    } else {
        tracing::subscriber::with_default(builder.finish(), || Config::load(config_path, cli))
    }
}

/// `RUST_LOG` when set, otherwise `metadraft=<level>`
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("metadraft={}", level)))
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to this
/// crate (`debug` with `--verbose`).
fn init_tracing(config: &Config, verbose: bool) {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let env_filter = env_filter(level);

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
