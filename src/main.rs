use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use tw_stocks::announce::{announce_one, ingest_announcements, MopsClient};
use tw_stocks::database::DatabaseManager;
use tw_stocks::importers::{self, StatementKind};
use tw_stocks::models::{AnnouncementRef, Config, ReportPeriod, Season};
use tw_stocks::screener::{QueryTemplates, StockScreenerManager};
use tw_stocks::{logging, revenue};

#[derive(Parser)]
#[command(
    name = "tw-stocks",
    about = "📈 Taiwan stock filings, revenue and screening",
    long_about = "Imports MOPS announcements, monthly revenue and prices into SQLite and runs the stock screener."
)]
struct Cli {
    /// Show debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or upgrade the database schema
    Migrate,
    /// Import the stock list (symbol,company_name,industry,market)
    ImportStocks { csv: PathBuf },
    /// Import a MOPS monthly revenue CSV
    ImportRevenue { csv: PathBuf },
    /// Import daily prices (date,symbol,open,high,low,close,volume,pe_ratio)
    ImportPrices { csv: PathBuf },
    /// Import quarterly income, balance sheet or cash flow rows
    ImportStatements {
        #[arg(value_enum)]
        kind: StatementKind,
        csv: PathBuf,
    },
    /// Fetch and process one self-reported income announcement
    Announce {
        #[arg(long)]
        symbol: String,
        /// ROC date as shown on MOPS, e.g. 1131030
        #[arg(long)]
        date: String,
        #[arg(long)]
        time: String,
        #[arg(long)]
        seq: String,
        /// Override the year recognised from the title (Gregorian)
        #[arg(long, requires = "season")]
        year: Option<i32>,
        #[arg(long, requires = "year")]
        season: Option<u8>,
    },
    /// Fetch and process announcements listed in a CSV (symbol,spoke_date,spoke_time,seq_no)
    AnnounceBatch { csv: PathBuf },
    /// Run every filter model and store today's (or the given date's) recommendations
    Screen {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show stored recommendations, latest date by default
    Recommendations {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List registered filter models
    FilterModels,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = Config::from_env().context("Failed to load configuration")?;
    let db = DatabaseManager::new(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;

    match cli.command {
        Command::Migrate => {
            for (table, count) in db.get_stats().await? {
                println!("  {:<20} {:>10}", table, count);
            }
        }
        Command::ImportStocks { csv } => {
            let report = importers::import_stocks_csv(&db, &csv).await?;
            println!("✅ {} stocks imported", report.imported);
        }
        Command::ImportRevenue { csv } => {
            let report = revenue::import_month_revenue_csv(&db, &csv)
                .await
                .with_context(|| format!("Failed to import {}", csv.display()))?;
            println!("✅ {} monthly revenues imported, {} skipped", report.imported, report.skipped);
        }
        Command::ImportPrices { csv } => {
            let report = importers::import_prices_csv(&db, &csv).await?;
            println!("✅ {} prices imported, {} skipped", report.imported, report.skipped);
        }
        Command::ImportStatements { kind, csv } => {
            let report = importers::import_statements_csv(&db, kind, &csv).await?;
            println!("✅ {} {:?} rows imported, {} skipped", report.imported, kind, report.skipped);
        }
        Command::Announce { symbol, date, time, seq, year, season } => {
            let hint = match (year, season) {
                (Some(year), Some(season)) => Some(ReportPeriod::new(year, Season::new(season)?)),
                _ => None,
            };
            let reference = AnnouncementRef {
                symbol,
                spoke_date: date,
                spoke_time: time,
                seq_no: seq,
            };
            let client = MopsClient::from_config(&config)?;
            let filing = announce_one(&db, &client, &reference, hint)
                .await
                .context("Failed to process announcement")?;
            let sheet = filing.sheet;
            info!("Stored {} {}", reference.symbol, sheet.period);
            println!(
                "✅ {} {}: revenue {:.0}, EPS {:.2}, gross margin {}",
                reference.symbol,
                sheet.period,
                sheet.operating_revenue,
                sheet.eps,
                sheet.gross_margin.map(|m| format!("{:.1}%", m)).unwrap_or_else(|| "n/a".into())
            );
        }
        Command::AnnounceBatch { csv } => {
            let refs = importers::read_announcement_refs_csv(&csv)?;
            let client = MopsClient::from_config(&config)?;
            let report = ingest_announcements(&db, &client, refs, config.fetch_concurrency).await;
            println!(
                "✅ {} processed, {} skipped, {} failed",
                report.processed, report.skipped, report.failed
            );
        }
        Command::Screen { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let templates = match &config.screener_template_path {
                Some(path) => QueryTemplates::load(path)?,
                None => QueryTemplates::builtin()?,
            };
            let manager = StockScreenerManager::new(db.clone(), templates, config.screener.clone());
            let report = manager.run(date).await?;

            println!(
                "📊 {} (season {}, month {}-{:02}): {} candidates",
                report.date, report.reference_season, report.reference_month.0, report.reference_month.1, report.candidates
            );
            for (model, symbols) in &report.matches {
                println!("  {:<24} {}", model, symbols.join(" "));
            }
        }
        Command::Recommendations { date } => {
            let date = match date {
                Some(date) => Some(date),
                None => db.latest_recommendation_date().await?,
            };
            let Some(date) = date else {
                println!("No recommendations stored yet");
                return Ok(());
            };
            println!("📅 {}", date);
            for rec in db.get_recommendations(date).await? {
                println!("  {:<24} {}", rec.filter_model, rec.symbol);
            }
        }
        Command::FilterModels => {
            for model in db.list_filter_models().await? {
                println!("  {:<24} {}", model.name, model.description);
            }
        }
    }

    db.close().await;
    Ok(())
}
