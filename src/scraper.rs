//! Channel scraper: pulls recent messages and photos into the data lake.
//!
//! Channels are scraped one after another. Each channel is paged newest
//! first from the end of the retention window; with an ordered source the
//! scan stops at the first message older than the window start, otherwise
//! out-of-window messages are filtered and scanning continues up to the
//! per-channel cap.

use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::config::ScraperConfig;
use crate::data_lake::DataLake;
use crate::metrics::{self, MESSAGES_SCRAPED, PHOTOS_DOWNLOADED};
use crate::error::{PipelineError, Result, SourceError};
use crate::models::{MessageRecord, RetentionWindow};
use crate::source::{ChannelSource, SourceMessage};

/// Knobs controlling one scrape
#[derive(Debug, Clone, Copy)]
pub struct ScrapeOptions {
    pub page_size: usize,
    /// Upper bound on messages inspected per channel
    pub max_messages: usize,
    pub assume_ordered: bool,
    /// Consecutive rate-limit waits tolerated before giving up on a channel
    pub max_rate_limit_retries: u32,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_messages: 1000,
            assume_ordered: true,
            max_rate_limit_retries: 5,
        }
    }
}

impl From<&ScraperConfig> for ScrapeOptions {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_messages: config.max_messages_per_channel,
            assume_ordered: config.assume_ordered,
            max_rate_limit_retries: config.max_rate_limit_retries,
        }
    }
}

/// Outcome of scraping one channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelReport {
    pub channel: String,
    /// Messages inspected, including ones outside the window
    pub scanned: usize,
    pub messages_written: usize,
    pub photos_downloaded: usize,
    pub media_failures: usize,
    pub rate_limit_waits: u32,
    /// Set when the channel was abandoned part way
    pub error: Option<String>,
}

/// Outcome of a whole scrape run
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    pub channels: Vec<ChannelReport>,
}

impl ScrapeReport {
    #[must_use]
    pub fn messages_written(&self) -> usize {
        self.channels.iter().map(|c| c.messages_written).sum()
    }

    #[must_use]
    pub fn failed_channels(&self) -> Vec<&str> {
        self.channels
            .iter()
            .filter(|c| c.error.is_some())
            .map(|c| c.channel.as_str())
            .collect()
    }
}

/// Scrapes channels from a source into the data lake
pub struct Scraper<S> {
    source: S,
    lake: DataLake,
    options: ScrapeOptions,
}

impl<S: ChannelSource> Scraper<S> {
    pub const fn new(source: S, lake: DataLake, options: ScrapeOptions) -> Self {
        Self { source, lake, options }
    }

    /// Scrape every channel in turn.
    ///
    /// A failing channel is logged and skipped; only credential failures
    /// abort the run.
    pub async fn scrape(&self, channels: &[String], window: RetentionWindow) -> Result<ScrapeReport> {
        info!(
            channels = channels.len(),
            start = %window.start,
            end = %window.end,
            "Starting scrape"
        );

        let mut report = ScrapeReport::default();
        for channel in channels {
            let mut channel_report = ChannelReport {
                channel: channel.clone(),
                ..ChannelReport::default()
            };

            match self.scrape_channel(channel, window, &mut channel_report).await {
                Ok(()) => info!(
                    channel = %channel,
                    messages = channel_report.messages_written,
                    photos = channel_report.photos_downloaded,
                    "Finished channel"
                ),
                Err(e) if e.is_fatal() => {
                    error!(channel = %channel, error = %e, "Aborting scrape");
                    return Err(e);
                }
                Err(e) => {
                    error!(channel = %channel, error = %e, "Channel scrape failed, moving on");
                    channel_report.error = Some(e.to_string());
                }
            }
            report.channels.push(channel_report);
        }

        info!(messages = report.messages_written(), "Scrape complete");
        Ok(report)
    }

    #[instrument(skip_all, fields(channel = %channel))]
    async fn scrape_channel(
        &self,
        channel: &str,
        window: RetentionWindow,
        report: &mut ChannelReport,
    ) -> Result<()> {
        self.lake.prepare_channel(channel).await?;

        let mut offset_id = None;
        let mut waits = 0;

        'scan: while report.scanned < self.options.max_messages {
            let limit = self.options.page_size.min(self.options.max_messages - report.scanned);
            let page = match self.source.fetch_page(channel, window.end, offset_id, limit).await {
                Ok(page) => {
                    waits = 0;
                    page
                }
                Err(SourceError::RateLimited { retry_after }) => {
                    self.back_off(retry_after, &mut waits, report).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if page.is_empty() {
                break;
            }

            for message in page {
                report.scanned += 1;
                offset_id = Some(message.id);

                if message.date < window.start {
                    if self.options.assume_ordered {
                        info!(before = %window.start, "Reached messages older than the window, stopping");
                        break 'scan;
                    }
                    continue;
                }
                if message.date >= window.end {
                    continue;
                }

                self.store_message(channel, &message, report).await?;
            }
        }

        if report.scanned >= self.options.max_messages {
            warn!(cap = self.options.max_messages, "Message cap reached");
        }
        Ok(())
    }

    /// Download the photo (if any) and append the record to its daily log
    async fn store_message(
        &self,
        channel: &str,
        message: &SourceMessage,
        report: &mut ChannelReport,
    ) -> Result<()> {
        let mut record = MessageRecord::new(
            message.id,
            channel,
            message.date,
            message.text.clone(),
            message.has_media,
        );

        if message.has_photo {
            match self.download_photo(channel, message, report).await {
                Ok(path) => {
                    record = record.attach_photo(path);
                    report.photos_downloaded += 1;
                    metrics::increment(PHOTOS_DOWNLOADED, 1);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!(message_id = message.id, error = %e, "Failed to download media");
                    report.media_failures += 1;
                }
            }
        }

        self.lake.append(&record).await?;
        report.messages_written += 1;
        metrics::increment(MESSAGES_SCRAPED, 1);
        Ok(())
    }

    async fn download_photo(
        &self,
        channel: &str,
        message: &SourceMessage,
        report: &mut ChannelReport,
    ) -> Result<String> {
        let dest = self.lake.image_path(channel, message.id);
        let mut waits = 0;
        loop {
            match self.source.download_photo(channel, message, &dest).await {
                Ok(()) => return Ok(dest.to_string_lossy().into_owned()),
                Err(SourceError::RateLimited { retry_after }) => {
                    self.back_off(retry_after, &mut waits, report).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Sleep for the signaled duration, or fail once the retry budget is spent
    async fn back_off(&self, retry_after: Duration, waits: &mut u32, report: &mut ChannelReport) -> Result<()> {
        if *waits >= self.options.max_rate_limit_retries {
            return Err(PipelineError::Source(SourceError::RateLimited { retry_after }));
        }
        *waits += 1;
        report.rate_limit_waits += 1;
        warn!(
            wait_secs = retry_after.as_secs_f64(),
            attempt = *waits,
            "Rate limit hit, waiting before resuming"
        );
        tokio::time::sleep(retry_after).await;
        Ok(())
    }
}
