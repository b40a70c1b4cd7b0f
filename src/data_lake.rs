//! Raw log layout for scraped messages.
//!
//! The data lake keeps one directory per channel holding one JSON-lines file
//! per UTC day (`{channel}/{YYYY-MM-DD}.json`) and an `images/` directory with
//! one `{message_id}.jpg` per downloaded photo. Log files are only ever
//! appended to, so several scrapes on the same day accumulate.

use std::path::PathBuf;

use chrono::NaiveDate;
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::models::MessageRecord;

/// Root of the raw message logs
#[derive(Debug, Clone)]
pub struct DataLake {
    root: PathBuf,
}

impl DataLake {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding everything scraped from `channel`
    #[must_use]
    pub fn channel_dir(&self, channel: &str) -> PathBuf {
        self.root.join(channel)
    }

    /// Daily log file that a message posted on `day` belongs in
    #[must_use]
    pub fn log_path(&self, channel: &str, day: NaiveDate) -> PathBuf {
        self.channel_dir(channel).join(format!("{}.json", day.format("%Y-%m-%d")))
    }

    /// Where the photo of `message_id` is stored
    #[must_use]
    pub fn image_path(&self, channel: &str, message_id: i64) -> PathBuf {
        self.channel_dir(channel).join("images").join(format!("{message_id}.jpg"))
    }

    /// Create the channel and image directories
    pub async fn prepare_channel(&self, channel: &str) -> Result<()> {
        create_dir_all(self.channel_dir(channel).join("images")).await?;
        Ok(())
    }

    /// Append `record` as one JSON line to the log for its own day.
    ///
    /// Returns the log file written to.
    pub async fn append(&self, record: &MessageRecord) -> Result<PathBuf> {
        let path = self.log_path(&record.channel_name, record.day());
        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(path)
    }
}
