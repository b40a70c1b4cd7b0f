use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use telegram_pipeline::analytics::Analytics;
use telegram_pipeline::api;
use telegram_pipeline::config::AppConfig;
use telegram_pipeline::data_lake::DataLake;
use telegram_pipeline::db::Database;
use telegram_pipeline::detection::CommandDetector;
use telegram_pipeline::enricher::Enricher;
use telegram_pipeline::loader::RawLoader;
use telegram_pipeline::logging::{init_logging, OperationTimer};
use telegram_pipeline::models::RetentionWindow;
use telegram_pipeline::pipeline::{run_on_schedule, Pipeline};
use telegram_pipeline::scraper::{ScrapeOptions, Scraper};
use telegram_pipeline::source::GatewaySource;
use telegram_pipeline::transform::Transform;
use telegram_pipeline::validation::InputValidator;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape channels into the data lake
    Scrape {
        /// Channel to scrape (repeatable, defaults to the configured list)
        #[arg(short, long = "channel")]
        channels: Vec<String>,

        /// Days of history to fetch, ending now
        #[arg(short, long)]
        days: Option<i64>,
    },
    /// Load the data lake into the raw message table
    Load,
    /// Rebuild the warehouse marts
    Transform,
    /// Run object detection over downloaded photos
    Enrich,
    /// Serve the analytics API
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run scrape, load, transform and enrich once
    Run,
    /// Run the pipeline on the configured cron schedule
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load()?;

    // Initialize logging; the context must live until exit
    let _logging = init_logging(&config.logging)?;

    info!("Starting telegram-pipeline");

    // Process command; scraping only touches the data lake
    match cli.command {
        Commands::Scrape { channels, days } => scrape(&config, channels, days).await?,
        Commands::Load => load(&config, open_warehouse(&config)?).await?,
        Commands::Transform => {
            let db = open_warehouse(&config)?;
            let transform = Transform::from_config(&config.transform)?;
            transform.run(&db).await.context("Transformation failed")?;
        }
        Commands::Enrich => enrich(&config, open_warehouse(&config)?).await?,
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.api.port = port;
            }
            api::serve(&config.api, Analytics::new(open_warehouse(&config)?)).await?;
        }
        Commands::Run => {
            let pipeline = Pipeline::from_config(&config, &open_warehouse(&config)?)?;
            pipeline.run_once().await?;
        }
        Commands::Schedule => {
            let schedule = config.cron_schedule()?;
            let pipeline = Pipeline::from_config(&config, &open_warehouse(&config)?)?;
            info!(cron = %config.schedule.cron, "Starting scheduler");
            run_on_schedule(&schedule, &pipeline, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }
    }

    Ok(())
}

fn open_warehouse(config: &AppConfig) -> Result<Database> {
    Database::from_config(config).context("Failed to open the warehouse")
}

async fn scrape(config: &AppConfig, channels: Vec<String>, days: Option<i64>) -> Result<()> {
    let channels = if channels.is_empty() {
        config.scraper.channels.clone()
    } else {
        for channel in &channels {
            InputValidator::validate_channel_name(channel)?;
        }
        channels
    };
    let days = days.unwrap_or(config.scraper.retention_days);
    if days <= 0 {
        anyhow::bail!("--days must be greater than 0");
    }

    let timer = OperationTimer::new("scrape");
    let source = GatewaySource::new(&config.telegram)?;
    let scraper = Scraper::new(
        source,
        DataLake::new(&config.scraper.data_lake_path),
        ScrapeOptions::from(&config.scraper),
    );
    let report = scraper
        .scrape(&channels, RetentionWindow::trailing_days(days, Utc::now()))
        .await?;
    timer.finish();

    for channel in &report.channels {
        info!(
            channel = %channel.channel,
            messages = channel.messages_written,
            photos = channel.photos_downloaded,
            media_failures = channel.media_failures,
            error = channel.error.as_deref().unwrap_or("-"),
            "Channel summary"
        );
    }
    Ok(())
}

async fn load(config: &AppConfig, db: Database) -> Result<()> {
    let timer = OperationTimer::new("load");
    let loader = RawLoader::new(db, config.scraper.data_lake_path.clone());
    let report = tokio::task::spawn_blocking(move || loader.load_all()).await??;
    timer.finish();

    for failure in &report.failures {
        warn!(file = %failure.path.display(), error = %failure.error, "File was not loaded");
    }
    info!(
        files = report.files_loaded,
        rows = report.rows_inserted,
        skipped_lines = report.lines_skipped,
        "Load summary"
    );
    Ok(())
}

async fn enrich(config: &AppConfig, db: Database) -> Result<()> {
    let timer = OperationTimer::new("enrich");
    let detector = CommandDetector::from_config(&config.detection);
    let report = tokio::task::spawn_blocking(move || Enricher::new(&db, &detector).run()).await??;
    timer.finish();

    info!(
        scanned = report.images_scanned,
        missing = report.images_missing,
        failed = report.images_failed,
        detections = report.detections_inserted,
        "Enrichment summary"
    );
    Ok(())
}
