use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod aggregate;
mod anomaly;
mod config;
mod db;
mod forecast;
mod ingest;
mod models;
mod momentum;
mod pipeline;
mod report;
mod skills;
mod store;

use config::AppConfig;
use store::CuratedStore;

#[derive(Parser)]
#[command(name = "job-momentum")]
#[command(about = "Job market momentum index and alerting over curated postings", long_about = None)]
struct Cli {
    /// Directory holding the curated tables (overrides CURATED_DIR)
    #[arg(long, global = true)]
    curated_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every stage: aggregate, skills, forecast, alerts, momentum
    Run {
        #[arg(long)]
        jobs: Option<PathBuf>,
        /// Forecast table from an external model (overrides FORECASTS_PATH)
        #[arg(long)]
        forecasts: Option<PathBuf>,
    },
    /// Rebuild daily aggregates and the skill frequency table
    Aggregate {
        #[arg(long)]
        jobs: Option<PathBuf>,
    },
    /// Regenerate alerts from the curated tables
    Alerts,
    /// Recompute the momentum index from the curated tables
    Score,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "momentum_report.md")]
        out: PathBuf,
    },
    /// Create or upgrade the database schema
    InitDb,
    /// Store the current momentum index and alerts in Postgres
    Publish,
    /// Show recently published momentum runs
    History {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let (jobs, forecasts) = match &cli.command {
        Commands::Run { jobs, forecasts } => (jobs.clone(), forecasts.clone()),
        Commands::Aggregate { jobs } => (jobs.clone(), None),
        _ => (None, None),
    };
    let config = AppConfig::from_env()?.with_overrides(jobs, cli.curated_dir, forecasts);
    let store = CuratedStore::new(&config.curated_dir);

    match cli.command {
        Commands::Run { .. } => {
            let output = pipeline::run(&config, Utc::now())?;
            let index = &output.momentum;
            println!(
                "Momentum index {:.1}/100 ({}) from {} days of postings.",
                index.overall_score,
                index.interpretation.label,
                output.aggregates.overall.len()
            );
            println!(
                "{} alerts, {} forecasts, {} companies, {} distinct skills.",
                output.alerts.len(),
                output.forecasts.len(),
                output.companies.len(),
                output.skills.overall.len()
            );
            println!("Recommendation: {}", index.recommendation);
        }
        Commands::Aggregate { .. } => {
            let (aggregates, skill_table) = pipeline::aggregate_only(&config)?;
            println!(
                "Aggregated {} days across {} category rows and {} location rows; {} distinct skills.",
                aggregates.overall.len(),
                aggregates.by_category.len(),
                aggregates.by_location.len(),
                skill_table.overall.len()
            );
        }
        Commands::Alerts => {
            let alerts = pipeline::alerts_from_store(&config, Utc::now())?;

            if alerts.is_empty() {
                println!("No alerts generated.");
                return Ok(());
            }

            println!("Alerts:");
            for alert in alerts.iter() {
                println!("- [{}] {}", alert.severity.as_str(), alert.message);
            }
        }
        Commands::Score => {
            let index = pipeline::momentum_from_store(&config, Utc::now())?;
            println!(
                "Momentum index {:.1}/100 ({})",
                index.overall_score, index.interpretation.label
            );
            if let Some(warning) = &index.warning {
                println!("Warning: {warning}");
            }
            println!("Recommendation: {}", index.recommendation);
        }
        Commands::Report { out } => {
            let index = match store.read_momentum()? {
                Some(index) => index,
                None => pipeline::momentum_from_store(&config, Utc::now())?,
            };
            let alerts = store.read_alerts()?.unwrap_or_default();
            let skill_table = store.read_skill_frequency()?;
            let companies = store.read_company_stats()?;

            let report = report::build_report(
                &index,
                &alerts,
                skill_table.as_ref(),
                companies.as_deref(),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write report to {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Publish => {
            let index = store.read_momentum()?.with_context(|| {
                format!(
                    "no momentum index in {}; run the pipeline first",
                    config.curated_dir.display()
                )
            })?;
            let alerts = store.read_alerts()?.unwrap_or_default();

            let pool = connect(&config).await?;
            let run_id = db::publish_run(&pool, &index, &alerts).await?;
            println!(
                "Published run {run_id} (score {:.1}, {} alerts).",
                index.overall_score,
                alerts.len()
            );
        }
        Commands::History { limit } => {
            let pool = connect(&config).await?;
            let snapshots = db::fetch_history(&pool, limit).await?;

            if snapshots.is_empty() {
                println!("No published runs yet.");
                return Ok(());
            }

            println!("Recent momentum runs:");
            for snapshot in snapshots.iter() {
                println!(
                    "- {} {} score {:.1} ({}) with {} alerts",
                    snapshot.calculated_at.format("%Y-%m-%d %H:%M"),
                    snapshot.run_id,
                    snapshot.overall_score,
                    snapshot.band,
                    snapshot.alert_count
                );
            }
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = config.require_database_url()?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}
