mod browser;
mod config;
mod csv_sink;
mod dataset;
mod error;
mod extract;
mod input;
mod record;
mod runner;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::browser::WebDriverFetcher;
use crate::config::Settings;
use crate::csv_sink::CsvSink;
use crate::extract::Extractor;
use crate::runner::Sinks;

#[derive(Parser)]
#[command(name = "yelp_scraper", about = "Yelp business listing scraper")]
struct Cli {
    /// Config file (default: ./scraper.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape listing pages into the dataset and CSV
    Run {
        /// Listing URLs (default: read from the input file)
        urls: Vec<String>,
        /// Input file: {"urls": [...]}, a JSON array, or one URL per line
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Max URLs to process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract a record from a saved HTML page (no browser)
    Extract {
        /// Rendered page HTML
        #[arg(long)]
        html: PathBuf,
        /// URL the page was loaded from
        #[arg(long)]
        url: String,
    },
    /// Show dataset statistics
    Stats {
        /// Recent records to list
        #[arg(short = 'n', long, default_value = "5")]
        latest: usize,
    },
    /// Dump the dataset as a JSON array
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check that the WebDriver endpoint is up
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Run { urls, input, limit } => {
            let mut urls = if urls.is_empty() {
                let path = input.unwrap_or_else(|| settings.input_path.clone());
                input::load(&path)?
            } else {
                input::clean(urls)
            };
            if let Some(n) = limit {
                urls.truncate(n);
            }
            if urls.is_empty() {
                bail!("Please provide at least one Yelp URL in the input");
            }

            let extractor = Extractor::new(&settings.selectors)?;
            let mut sinks = Sinks {
                dataset: dataset::open(&settings.dataset_path)?,
                csv: CsvSink::open(&settings.csv_path)?,
            };
            let fetcher = WebDriverFetcher::connect(&settings.browser).await?;

            println!("Scraping {} pages...", urls.len());
            let stats =
                runner::scrape_all(&urls, fetcher, &extractor, &mut sinks, settings.delay())
                    .await?;
            println!(
                "Done: {} scraped ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            println!(
                "Dataset: {} ({} records) | CSV: {} (+{} rows)",
                settings.dataset_path.display(),
                dataset::count(&sinks.dataset)?,
                settings.csv_path.display(),
                sinks.csv.rows()
            );
            Ok(())
        }
        Commands::Extract { html, url } => {
            let extractor = Extractor::new(&settings.selectors)?;
            let markup = std::fs::read_to_string(&html)
                .with_context(|| format!("Failed to read {}", html.display()))?;
            let record = extractor.extract(&markup, &url);
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Commands::Stats { latest } => {
            let conn = dataset::open(&settings.dataset_path)?;
            let total = dataset::count(&conn)?;
            println!("Records: {}", total);
            if total == 0 {
                return Ok(());
            }

            println!(
                "\n{:<28} | {:<28} | {:>6} | {:>7} | {:<20}",
                "Business ID", "Name", "Rating", "Reviews", "Pushed"
            );
            println!("{}", "-".repeat(101));
            for s in dataset::latest(&conn, latest)? {
                let r = &s.record;
                println!(
                    "{:<28} | {:<28} | {:>6} | {:>7} | {:<20}",
                    truncate(&r.encid, 28),
                    truncate(&r.name, 28),
                    r.rating,
                    r.review_count,
                    truncate(&s.pushed_at, 20)
                );
            }
            Ok(())
        }
        Commands::Export { output } => {
            let conn = dataset::open(&settings.dataset_path)?;
            let records = dataset::all(&conn)?;
            let json = serde_json::to_string_pretty(&records)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported {} records to {}", records.len(), path.display());
                }
                None => println!("{}", json),
            }
            Ok(())
        }
        Commands::Check => {
            let url = &settings.browser.webdriver_url;
            let (ready, message) = browser::probe(url).await?;
            info!(%url, ready, "WebDriver status");
            if ready {
                println!("WebDriver at {} is ready. {}", url, message);
                Ok(())
            } else {
                bail!("WebDriver at {} is not ready: {}", url, message)
            }
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
