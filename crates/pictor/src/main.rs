//! Pictor CLI - search, vet, and select images for a query.
//!
//! Pictor searches an image provider, downloads and validates candidates,
//! scores them with vision models, and selects the best matches. Winners
//! can be re-hosted to a CDN and persisted to a metadata store.
//!
//! # Usage
//!
//! ```bash
//! # Find the best 3 images for a query
//! pictor run "mountain sunrise" --top 3
//!
//! # Machine-readable report on stdout
//! pictor run "mountain sunrise" --format json
//!
//! # View configuration
//! pictor config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Pictor - image search-and-vetting pipeline.
#[derive(Parser, Debug)]
#[command(name = "pictor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline for a query and report the selected images
    Run(cli::run::RunArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging from config, with CLI verbose override.
    // Note: logging isn't initialized yet, so use eprintln for config warnings.
    let config = match pictor_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `pictor config path`."
            );
            pictor_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Pictor v{}", pictor_core::VERSION);

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
