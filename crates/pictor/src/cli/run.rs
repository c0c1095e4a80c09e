//! The `pictor run` command: execute the pipeline for one query.

use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use pictor_core::{Agent, Config, RunReport, SearchQuery};
use serde::Serialize;
use std::time::Duration;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Search query
    #[arg(required = true)]
    pub query: String,

    /// Number of images to select
    #[arg(short, long)]
    pub top: Option<usize>,

    /// Locale hint for the search provider (e.g., "en-US")
    #[arg(long)]
    pub locale: Option<String>,

    /// Disable safe-search filtering
    #[arg(long)]
    pub no_safe_search: bool,

    /// Skip re-hosting the selected images
    #[arg(long)]
    pub no_upload: bool,

    /// Skip persisting metadata records
    #[arg(long)]
    pub no_store: bool,

    /// Output format for the report
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Machine-readable JSON report on stdout
    Json,
}

/// JSON shape of the run report.
#[derive(Serialize)]
struct JsonReport<'a> {
    query: &'a str,
    summary: &'a pictor_core::RunSummary,
    winners: Vec<JsonWinner<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fatal: Option<&'a str>,
}

#[derive(Serialize)]
struct JsonWinner<'a> {
    rank: u32,
    candidate_id: &'a str,
    total_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    hosted_url: Option<&'a str>,
}

/// Execute the run command.
pub async fn execute(args: RunArgs, mut config: Config) -> anyhow::Result<()> {
    if args.no_upload {
        config.hosting.enabled = false;
    }
    if args.no_store {
        config.storage.enabled = false;
    }

    let agent = Agent::from_config(config)?;
    let query = SearchQuery {
        text: args.query.clone(),
        locale: args.locale.clone(),
        safe_search: !args.no_safe_search,
    };

    let spinner = create_spinner(&args.query);
    let report = agent.run(&query, args.top).await;
    spinner.finish_and_clear();

    match args.format {
        OutputFormat::Json => print_json(&args.query, &report)?,
        OutputFormat::Text => print_text(&report),
    }

    if let Some(fatal) = &report.fatal {
        anyhow::bail!("run failed: {fatal}");
    }
    Ok(())
}

fn create_spinner(query: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("searching and vetting images for \"{query}\""));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_json(query: &str, report: &RunReport) -> anyhow::Result<()> {
    let winners = report
        .winners()
        .into_iter()
        .map(|w| JsonWinner {
            rank: w.rank.unwrap_or(0),
            candidate_id: &w.candidate_id,
            total_score: w.total_score,
            hosted_url: report
                .hosted
                .iter()
                .find(|h| h.candidate_id == w.candidate_id)
                .map(|h| h.public_url.as_str()),
        })
        .collect();

    let json_report = JsonReport {
        query,
        summary: &report.summary,
        winners,
        fatal: report.fatal.as_deref(),
    };
    println!("{}", serde_json::to_string_pretty(&json_report)?);
    Ok(())
}

fn print_text(report: &RunReport) {
    let summary = &report.summary;

    for winner in report.winners() {
        let rank = winner.rank.unwrap_or(0);
        let hosted = report
            .hosted
            .iter()
            .find(|h| h.candidate_id == winner.candidate_id);
        println!(
            "{} {} (score {:.3}){}",
            style(format!("#{rank}")).cyan().bold(),
            winner.candidate_id,
            winner.total_score,
            hosted
                .map(|h| format!("  {}", style(&h.public_url).underlined()))
                .unwrap_or_default()
        );
    }

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Attempted:    {:>8}", summary.attempted);
    eprintln!("    Processed:    {:>8}", summary.processed);
    if summary.rejected > 0 {
        eprintln!("    Rejected:     {:>8}", summary.rejected);
        for (reason, count) in &summary.rejection_reasons {
            eprintln!("      {reason:<18} {count:>4}");
        }
    }
    eprintln!("    Analyzed:     {:>8}", summary.analyzed);
    if summary.analysis_failed > 0 {
        eprintln!("    Unanalyzable: {:>8}", summary.analysis_failed);
    }
    eprintln!("    Selected:     {:>8}", summary.selected);
    eprintln!("  ------------------------------------");
    eprintln!("    Cost:         {:>7.4}$", summary.total_cost_usd);
    eprintln!(
        "    Duration:     {:>7.1}s",
        summary.duration_ms as f64 / 1000.0
    );
    for error in &summary.errors {
        eprintln!("    {} {error}", style("error:").red());
    }
    eprintln!();
}
