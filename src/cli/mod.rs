//! CLI argument parsing and command handling

use crate::options::LoadOptions;
use crate::output::{render_summary, CsvExporter, ExcelExporter, JsonExporter};
use crate::runner::{LoadRunner, RunOutcome};
use crate::target::HttpTarget;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::stream::{self, Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Exit status when the run completed but a threshold was crossed
pub const THRESHOLDS_FAILED_EXIT_CODE: u8 = 99;

/// Exit status after a second Ctrl+C skips the graceful drain
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Ticket Surge - scenario-based load testing for the ticket service
#[derive(Parser, Debug)]
#[command(name = "ticket-surge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the load test
    Run {
        /// TOML options file (defaults to the built-in ticket rush profile)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Base URL of the ticket service, overrides the options file
        #[arg(short, long, env = "BASE_URL")]
        base_url: Option<String>,

        /// Export results to JSON
        #[arg(long)]
        json: bool,

        /// Export results to CSV
        #[arg(long)]
        csv: bool,

        /// Export results to Excel (.xlsx)
        #[arg(long)]
        excel: bool,

        /// Output directory for results
        #[arg(long, default_value = "results")]
        output_dir: String,

        /// Hide progress spinners
        #[arg(short, long)]
        quiet: bool,
    },

    /// Check an options file without sending any traffic
    Validate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the scenario timeline
    Plan {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Log filter directive implied by the flags
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Dispatch the selected command
    pub async fn run(&self) -> Result<ExitCode> {
        match &self.command {
            Command::Run {
                config,
                base_url,
                json,
                csv,
                excel,
                output_dir,
                quiet,
            } => {
                let options = load_options(config.as_deref(), base_url.as_deref())?;
                let exports = Exports {
                    json: *json,
                    csv: *csv,
                    excel: *excel,
                    output_dir,
                };
                run_load_test(options, &exports, !*quiet).await
            }
            Command::Validate { config } => {
                let options = load_options(config.as_deref(), None)?;
                options.validate().context("Invalid load test options")?;
                println!(
                    "✓ {} scenario(s), {} threshold metric(s), base URL {}",
                    options.scenarios.len(),
                    options.thresholds.len(),
                    options.base_url
                );
                Ok(ExitCode::SUCCESS)
            }
            Command::Plan { config } => {
                let options = load_options(config.as_deref(), None)?;
                options.validate().context("Invalid load test options")?;
                print!("{}", render_plan(&options));
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

struct Exports<'a> {
    json: bool,
    csv: bool,
    excel: bool,
    output_dir: &'a str,
}

impl Exports<'_> {
    fn any(&self) -> bool {
        self.json || self.csv || self.excel
    }
}

/// Built-in profile, replaced by the options file if given, then CLI overrides
pub fn load_options(config: Option<&Path>, base_url: Option<&str>) -> Result<LoadOptions> {
    let options = match config {
        Some(path) => LoadOptions::from_file(path)
            .with_context(|| format!("Failed to load options from: {}", path.display()))?,
        None => LoadOptions::ticket_rush(),
    };

    Ok(match base_url {
        Some(url) => options.with_base_url(url),
        None => options,
    })
}

async fn run_load_test(options: LoadOptions, exports: &Exports<'_>, progress: bool) -> Result<ExitCode> {
    let target = HttpTarget::new(options.base_url.clone())
        .with_context(|| format!("Invalid base URL: {}", options.base_url))?;

    println!("\n{}", "=".repeat(70));
    println!("   Ticket Surge - Load Test");
    println!("{}", "=".repeat(70));
    println!();
    println!("Configuration:");
    println!("  Base URL:     {}", options.base_url);
    println!("  Scenarios:    {}", options.scenarios.len());
    println!(
        "  Duration:     {}",
        humantime::format_duration(options.scenarios.total_duration())
    );
    for (metric, expressions) in &options.thresholds {
        println!("  Threshold:    {} {}", metric, expressions.join(", "));
    }
    println!("{}", "=".repeat(70));
    println!();

    let runner = LoadRunner::new(options, target).with_progress(progress);

    let shutdown = runner.shutdown_handle();
    let signals = stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    });
    tokio::spawn(handle_interrupts(
        Box::pin(signals),
        move || shutdown.shutdown(),
        || std::process::exit(INTERRUPTED_EXIT_CODE),
    ));

    let outcome = runner.run().await?;

    println!();
    print!("{}", render_summary(&outcome.metrics, &outcome.thresholds));
    if outcome.cancelled() {
        println!("(run interrupted before all scenarios finished)");
    }

    if exports.any() {
        write_exports(&outcome, runner.options(), exports)?;
    }

    if outcome.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(THRESHOLDS_FAILED_EXIT_CODE))
    }
}

/// First interrupt stops the run gracefully, a second one forces exit
async fn handle_interrupts<S>(mut signals: S, stop: impl FnOnce(), force_exit: impl FnOnce())
where
    S: Stream<Item = ()> + Unpin,
{
    if signals.next().await.is_none() {
        return;
    }
    tracing::warn!("Interrupt received, stopping scenarios (Ctrl+C again to exit now)");
    stop();

    if signals.next().await.is_some() {
        tracing::warn!("Second interrupt received, exiting");
        force_exit();
    }
}

fn write_exports(outcome: &RunOutcome, options: &LoadOptions, exports: &Exports<'_>) -> Result<()> {
    let dir = exports.output_dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir))?;

    println!("\n{}", "=".repeat(70));
    println!("   Exporting Results");
    println!("{}", "=".repeat(70));

    if exports.excel {
        let path = format!("{}/results.xlsx", dir);
        ExcelExporter::export(outcome, &path)
            .with_context(|| format!("Failed to export Excel to: {}", path))?;
        println!("✓ Excel exported to: {}", path);
    }

    if exports.csv {
        let path = format!("{}/results.csv", dir);
        CsvExporter::export(&outcome.collector, &path)
            .with_context(|| format!("Failed to export CSV to: {}", path))?;
        println!("✓ CSV exported to: {}", path);

        let summary_path = format!("{}/summary.csv", dir);
        CsvExporter::export_summary(&outcome.metrics, &summary_path)
            .with_context(|| format!("Failed to export CSV summary to: {}", summary_path))?;
        println!("✓ CSV summary exported to: {}", summary_path);
    }

    if exports.json {
        let path = format!("{}/results.json", dir);
        JsonExporter::export(outcome, options, &path)
            .with_context(|| format!("Failed to export JSON to: {}", path))?;
        println!("✓ JSON exported to: {}", path);
    }

    println!("{}", "=".repeat(70));
    println!();

    Ok(())
}

/// Timeline of the scenarios in start order
pub fn render_plan(options: &LoadOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!("Base URL: {}\n\n", options.base_url));
    out.push_str(&format!(
        "{:<20} {:<13} {:<16} {:>10} {:>10} {:>9}\n",
        "scenario", "executor", "exec", "start", "end", "peak vus"
    ));

    for (name, spec) in options.scenarios.by_start_time() {
        let window = spec.window();
        out.push_str(&format!(
            "{:<20} {:<13} {:<16} {:>10} {:>10} {:>9}\n",
            name,
            spec.executor.kind(),
            spec.exec.as_str(),
            humantime::format_duration(window.start).to_string(),
            humantime::format_duration(window.end).to_string(),
            spec.executor.peak_vus(),
        ));
    }

    out.push('\n');
    let overlaps = options.scenarios.overlaps();
    if overlaps.is_empty() {
        out.push_str("No overlapping scenario windows\n");
    } else {
        for (a, b) in overlaps {
            out.push_str(&format!("Overlap: {} and {} run concurrently\n", a, b));
        }
    }
    out.push_str(&format!(
        "Total duration: {}\n",
        humantime::format_duration(options.scenarios.total_duration())
    ));

    out
}
