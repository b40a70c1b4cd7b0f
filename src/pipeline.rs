//! Pipeline orchestration.
//!
//! A run executes scrape, load, transform and enrich strictly in that order.
//! A failing step aborts the rest of the run. Scheduled runs are independent:
//! the next trigger fires whatever happened to the previous one.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use cron::Schedule;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::data_lake::DataLake;
use crate::db::Database;
use crate::detection::{CommandDetector, Detector};
use crate::enricher::Enricher;
use crate::error::{PipelineError, Result};
use crate::loader::RawLoader;
use crate::logging::OperationTimer;
use crate::metrics;
use crate::models::RetentionWindow;
use crate::scraper::{ScrapeOptions, Scraper};
use crate::source::{ChannelSource, GatewaySource};
use crate::transform::Transform;

/// One atomic unit of a pipeline run
#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// Scrapes the trailing retention window ending now
pub struct ScrapeStep<S> {
    scraper: Scraper<S>,
    channels: Vec<String>,
    retention_days: i64,
}

impl<S: ChannelSource> ScrapeStep<S> {
    pub const fn new(scraper: Scraper<S>, channels: Vec<String>, retention_days: i64) -> Self {
        Self {
            scraper,
            channels,
            retention_days,
        }
    }
}

#[async_trait]
impl<S: ChannelSource> PipelineStep for ScrapeStep<S> {
    fn name(&self) -> &str {
        "scrape"
    }

    async fn run(&self) -> Result<()> {
        let window = RetentionWindow::trailing_days(self.retention_days, Utc::now());
        let report = self.scraper.scrape(&self.channels, window).await?;
        let failed = report.failed_channels();
        if !failed.is_empty() {
            warn!(channels = ?failed, "Some channels could not be scraped");
        }
        Ok(())
    }
}

/// Loads the data lake into the raw message table
pub struct LoadStep {
    db: Database,
    root: PathBuf,
}

impl LoadStep {
    pub fn new(db: Database, root: impl Into<PathBuf>) -> Self {
        Self { db, root: root.into() }
    }
}

#[async_trait]
impl PipelineStep for LoadStep {
    fn name(&self) -> &str {
        "load"
    }

    async fn run(&self) -> Result<()> {
        let loader = RawLoader::new(self.db.clone(), self.root.clone());
        let report = tokio::task::spawn_blocking(move || loader.load_all()).await??;
        if report.files_failed > 0 {
            warn!(files = report.files_failed, "Some files were rolled back");
        }
        Ok(())
    }
}

/// Rebuilds the warehouse marts
pub struct TransformStep {
    db: Database,
    transform: Transform,
}

impl TransformStep {
    pub const fn new(db: Database, transform: Transform) -> Self {
        Self { db, transform }
    }
}

#[async_trait]
impl PipelineStep for TransformStep {
    fn name(&self) -> &str {
        "transform"
    }

    async fn run(&self) -> Result<()> {
        self.transform.run(&self.db).await
    }
}

/// Runs object detection over downloaded photos
pub struct EnrichStep {
    db: Database,
    detector: Arc<dyn Detector>,
}

impl EnrichStep {
    pub fn new(db: Database, detector: Arc<dyn Detector>) -> Self {
        Self { db, detector }
    }
}

#[async_trait]
impl PipelineStep for EnrichStep {
    fn name(&self) -> &str {
        "enrich"
    }

    async fn run(&self) -> Result<()> {
        let db = self.db.clone();
        let detector = Arc::clone(&self.detector);
        tokio::task::spawn_blocking(move || Enricher::new(&db, detector.as_ref()).run()).await??;
        Ok(())
    }
}

/// An ordered list of steps
pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn PipelineStep>>) -> Self {
        Self { steps }
    }

    /// The standard scrape, load, transform, enrich pipeline
    pub fn from_config(config: &AppConfig, db: &Database) -> Result<Self> {
        let source = GatewaySource::new(&config.telegram)?;
        let scraper = Scraper::new(
            source,
            DataLake::new(&config.scraper.data_lake_path),
            ScrapeOptions::from(&config.scraper),
        );

        Ok(Self::new(vec![
            Box::new(ScrapeStep::new(
                scraper,
                config.scraper.channels.clone(),
                config.scraper.retention_days,
            )),
            Box::new(LoadStep::new(db.clone(), &config.scraper.data_lake_path)),
            Box::new(TransformStep::new(db.clone(), Transform::from_config(&config.transform)?)),
            Box::new(EnrichStep::new(
                db.clone(),
                Arc::new(CommandDetector::from_config(&config.detection)),
            )),
        ]))
    }

    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step once, stopping at the first failure
    pub async fn run_once(&self) -> Result<()> {
        info!(steps = ?self.step_names(), "Starting pipeline run");
        for step in &self.steps {
            let name = step.name();
            let timer = OperationTimer::new(name);
            let result = step.run().await;
            let duration = timer.finish();
            metrics::record_step(name, duration, result.is_ok());

            if let Err(e) = result {
                error!(step = name, error = %e, "Step failed, skipping remaining steps");
                return Err(PipelineError::Step {
                    step: name.to_string(),
                    message: e.to_string(),
                });
            }
        }
        info!("Pipeline run complete");
        Ok(())
    }
}

/// Trigger `pipeline` on every fire time of `schedule` until `shutdown` resolves
pub async fn run_on_schedule<F>(schedule: &Schedule, pipeline: &Pipeline, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("Schedule has no future fire times, stopping");
            return Ok(());
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!(next = %next, "Next pipeline run scheduled");

        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown requested, stopping scheduler");
                return Ok(());
            }
            () = tokio::time::sleep_until(Instant::now() + wait) => {}
        }

        if let Err(e) = pipeline.run_once().await {
            error!(error = %e, "Scheduled pipeline run failed");
        }
    }
}
