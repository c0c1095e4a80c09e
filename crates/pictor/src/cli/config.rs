//! The `pictor config` command: inspect and initialize configuration.

use clap::{Args, Subcommand};
use console::style;
use pictor_core::config::resolve_env_var;
use pictor_core::Config;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display the effective configuration and credential status
    Show,

    /// Show config file path
    Path,

    /// Initialize a new config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => show(),
        ConfigCommand::Path => {
            println!("{}", Config::default_path().display());
            Ok(())
        }
        ConfigCommand::Init { force } => init(force),
    }
}

/// Print the effective configuration (TOML on stdout) plus where it came
/// from and whether each credential resolves, on stderr.
fn show() -> anyhow::Result<()> {
    let path = Config::default_path();
    let config = Config::load()?;

    if path.exists() {
        eprintln!("# loaded from {}", path.display());
    } else {
        eprintln!("# built-in defaults ({} not found)", path.display());
    }
    println!("{}", config.to_toml()?);

    eprintln!("{}", style("credentials").bold());
    let checks = [
        ("search.api_key", config.search.api_key.as_str(), true),
        ("analysis.api_key", config.analysis.api_key.as_str(), true),
        (
            "hosting.api_key",
            config.hosting.api_key.as_str(),
            config.hosting.enabled,
        ),
        (
            "storage.api_key",
            config.storage.api_key.as_str(),
            config.storage.enabled,
        ),
    ];
    for (key, value, required) in checks {
        eprintln!("  {key:<18} {}", credential_status(value, required));
    }
    Ok(())
}

/// Where a credential comes from and whether it resolves. Never prints the
/// secret itself.
fn credential_status(value: &str, required: bool) -> String {
    if !required {
        return "unused (provider disabled)".to_string();
    }
    match (resolve_env_var(value), env_var_name(value)) {
        (Some(_), Some(var)) => format!("set (from ${var})"),
        (Some(_), None) => "set (in config file)".to_string(),
        (None, Some(var)) => format!("missing ({var} is not set)"),
        (None, None) => "missing (empty)".to_string(),
    }
}

fn env_var_name(value: &str) -> Option<&str> {
    value.strip_prefix("${")?.strip_suffix('}')
}

fn init(force: bool) -> anyhow::Result<()> {
    let path = Config::default_path();
    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}; use --force to overwrite",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, Config::default().to_toml()?)?;

    println!("configuration initialized at {}", path.display());
    Ok(())
}
