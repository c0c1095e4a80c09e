//! Logging setup for the CLI.
//!
//! Logs go to stderr; stdout is reserved for run output. The filter is
//! seeded from the configured level, `RUST_LOG` wins over the config file
//! when set, and the `--verbose` flag wins over both.

use pictor_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Initialize the subscriber from the loaded configuration plus CLI flags:
/// `--verbose` forces debug, `--json-logs` forces JSON output.
pub fn init_from_config(config: &Config, verbose: bool, json_logs: bool) {
    let level = resolve_level(&config.logging.level, verbose);
    let json = json_logs || config.logging.format == "json";
    init(level, json);
}

/// The effective level: `--verbose` forces debug, a recognized configured
/// level passes through, anything else falls back to info.
fn resolve_level(configured: &str, verbose: bool) -> &str {
    if verbose {
        return "debug";
    }
    if LEVELS.contains(&configured) {
        configured
    } else {
        "info"
    }
}

/// Initialize the subscriber at `level`, pretty or JSON, on stderr.
pub fn init(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_level_passes_through() {
        assert_eq!(resolve_level("warn", false), "warn");
        assert_eq!(resolve_level("error", false), "error");
        assert_eq!(resolve_level("trace", false), "trace");
    }

    #[test]
    fn test_verbose_flag_forces_debug() {
        assert_eq!(resolve_level("warn", true), "debug");
        assert_eq!(resolve_level("trace", true), "debug");
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        assert_eq!(resolve_level("chatty", false), "info");
        assert_eq!(resolve_level("", false), "info");
    }
}
