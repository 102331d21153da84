use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use x_thread_scraper::config::Config;
use x_thread_scraper::error::ScrapeError;
use x_thread_scraper::pipeline::{self, ScrapeRequest};

#[derive(Parser)]
#[command(name = "thread-scraper")]
#[command(about = "Save an X thread, with engagement counts and media URLs, as JSON")]
struct Args {
    /// JSON output file
    #[arg(short, long)]
    output: PathBuf,

    /// Also write a Markdown rendition of the thread
    #[arg(long, value_name = "FILE")]
    md: Option<PathBuf>,

    /// Also write one CSV row per post
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Show the browser window (overrides HEADLESS)
    #[arg(long)]
    headful: bool,

    /// Thread URL (e.g., https://x.com/naval/status/1002103360646823936)
    url: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Load .env file if present
    let _ = dotenvy::dotenv();

    if let Err(e) = init_tracing() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }

    if let Err(e) = run(args).await {
        error!("Fatal error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(args: Args) -> Result<(), ScrapeError> {
    let mut config = Config::from_env()?;
    config.validate()?;
    if args.headful {
        config.headless = false;
    }

    info!(
        scope = ?config.thread_scope,
        video_mode = ?config.video_mode,
        timezone = %config.timezone,
        "Configuration loaded"
    );

    let request = ScrapeRequest {
        thread_url: args.url,
        output: args.output,
        markdown: args.md,
        csv: args.csv,
    };
    let report = pipeline::run(&config, &request).await?;

    info!(
        posts = report.thread.len(),
        unresolved_media = report.unresolved.len(),
        duplicates_skipped = report.stats.repeat_sightings,
        outside_thread = report.stats.outside_thread,
        stop = ?report.stats.stop,
        "Done"
    );
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,x_thread_scraper=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    // stdout is left alone; logs go to stderr.
    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
