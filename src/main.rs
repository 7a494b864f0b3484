use std::path::PathBuf;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod category;
mod config;
mod dates;
mod error;
mod models;
mod pipeline;
mod report;
mod risk;
mod sources;
mod stats;
mod store;
mod unify;

use models::{Category, DatasetStats, RiskTier};
use pipeline::{PipelineOutcome, SourceCounts, SourceInputs};
use store::ConsolidatedStore;

#[derive(Parser)]
#[command(name = "food-alerts")]
#[command(about = "Consolidate and risk-score food safety recall alerts", long_about = None)]
struct Cli {
    /// Config file [default: ./food-alerts.toml, else built-in tables]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter and unify the latest extracts, then merge them into the consolidated dataset
    Run {
        /// Recall site extract [default: newest match in the scraps directory]
        #[arg(long)]
        source_a: Option<PathBuf>,
        /// Notification database extract [default: newest match in the scraps directory]
        #[arg(long)]
        source_b: Option<PathBuf>,
        /// Also write the markdown and scored CSV reports
        #[arg(long)]
        report: bool,
    },
    /// Print summary counts for the consolidated dataset
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// List the highest-risk alerts
    Score {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        category: Option<Category>,
    },
    /// Generate the markdown report and the scored CSV table
    Report {
        /// Report directory [default: <data_dir>/reports]
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;
    let today = Local::now().date_naive();

    match cli.command {
        Commands::Run {
            source_a,
            source_b,
            report,
        } => {
            let inputs = SourceInputs { source_a, source_b };
            let outcome = pipeline::run_pipeline(&config, &inputs, today)
                .context("pipeline aborted")?;

            match outcome {
                PipelineOutcome::NothingToProcess { sources } => {
                    print_source_counts(&sources);
                    println!("No alerts matched the target categories; nothing to merge.");
                    return Ok(());
                }
                PipelineOutcome::Completed(run) => {
                    print_source_counts(&run.sources);
                    println!(
                        "Unified {} alerts into {}.",
                        run.unified,
                        run.processed_path.display()
                    );
                    println!(
                        "Consolidated dataset {}: {} added, {} already present, {} total.",
                        run.merge.path.display(),
                        run.merge.added,
                        run.merge.skipped,
                        run.merge.total
                    );
                    if run.merge.collisions > 0 {
                        println!(
                            "Warning: {} alert ids were reused with different content.",
                            run.merge.collisions
                        );
                    }
                    print_stats(&run.stats);
                }
            }

            if report {
                write_reports(&config, None, today)?;
            }
        }
        Commands::Stats { json } => {
            let stats = stats::summarize_file(&config.paths.consolidated_path());
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
        Commands::Score { limit, category } => {
            let store = ConsolidatedStore::new(config.paths.consolidated_path());
            let alerts = store.load().context("failed to load consolidated dataset")?;
            let scored = risk::score_alerts(&alerts);
            let ranked: Vec<_> = report::rank_by_risk(&scored)
                .into_iter()
                .filter(|entry| category.map_or(true, |c| entry.alert.category == c))
                .collect();

            if ranked.is_empty() {
                println!("No alerts found.");
                return Ok(());
            }

            println!("Top alerts by risk level:");
            for entry in ranked.iter().take(limit) {
                println!(
                    "- {} {} ({}, {}) severity {} x probability {} = {} [{}]",
                    entry.alert.alert_id,
                    entry.alert.product_name,
                    entry.alert.category,
                    entry.alert.date,
                    entry.score.severity.label(),
                    entry.score.probability.label(),
                    entry.score.level,
                    entry.score.tier
                );
            }
            let high = scored.iter().filter(|s| s.score.tier == RiskTier::High).count();
            println!("{high} of {} alerts are high risk.", scored.len());
        }
        Commands::Report { out } => {
            write_reports(&config, out, today)?;
        }
    }

    Ok(())
}

fn write_reports(
    config: &config::Config,
    out: Option<PathBuf>,
    today: chrono::NaiveDate,
) -> anyhow::Result<()> {
    let store = ConsolidatedStore::new(config.paths.consolidated_path());
    let alerts = store.load().context("failed to load consolidated dataset")?;
    let scored = risk::score_alerts(&alerts);

    let dir = out.unwrap_or_else(|| config.paths.reports_dir());
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let stamp = today.format("%Y-%m-%d");
    let markdown_path = dir.join(format!("food_risk_report_{stamp}.md"));
    let csv_path = dir.join(format!("food_risk_alerts_{stamp}.csv"));

    std::fs::write(&markdown_path, report::build_report(config, today, &scored))?;
    report::write_scored_csv(&csv_path, &scored)?;

    println!("Report written to {}.", markdown_path.display());
    println!("Scored alerts written to {}.", csv_path.display());
    Ok(())
}

fn print_source_counts(sources: &[SourceCounts]) {
    for counts in sources.iter() {
        match &counts.path {
            Some(path) => println!(
                "{} ({}): {} rows read, {} kept",
                counts.source,
                path.display(),
                counts.read,
                counts.kept
            ),
            None => println!("{}: no extract found", counts.source),
        }
    }
}

fn print_stats(stats: &DatasetStats) {
    if let Some(error) = &stats.error {
        println!("Statistics unavailable: {error}");
        return;
    }

    println!("Total alerts: {}", stats.total);
    println!("By source:");
    for (source, count) in stats.by_source.iter() {
        println!("  - {source}: {count}");
    }
    println!("By category:");
    for (category, count) in stats.by_category.iter() {
        println!("  - {category}: {count}");
    }
    println!("Top origin countries:");
    for (country, count) in stats.by_country.iter().take(10) {
        println!("  - {country}: {count}");
    }
    println!(
        "Date range: {} to {}",
        stats.date_range.min.as_deref().unwrap_or("n/a"),
        stats.date_range.max.as_deref().unwrap_or("n/a")
    );
}
