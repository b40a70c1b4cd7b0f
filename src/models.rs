//! Data models for channel messages, detections and analytics rows
//!
//! This module contains the records that flow through the pipeline: what the
//! scraper writes to the data lake, what the loader reads back, what the
//! enricher stores, and the shapes the analytics API returns.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Kind of media attached to a message that we keep a copy of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// A photo downloaded as `images/{message_id}.jpg`
    Photo,
}

impl MediaType {
    /// Value stored in the `media_type` column
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
        }
    }
}

/// One ingested channel message, as written to the daily log files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message id, unique within its channel
    pub message_id: i64,
    /// Channel the message was posted in
    #[serde(default)]
    pub channel_name: String,
    /// When the message was posted
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
    /// Message text content
    pub text: Option<String>,
    /// True if the source message carried any media
    pub has_media: bool,
    /// Media we downloaded, if any
    pub media_type: Option<MediaType>,
    /// Local path of the downloaded media
    pub media_path: Option<String>,
}

impl MessageRecord {
    /// A record without downloaded media.
    #[must_use]
    pub fn new(
        message_id: i64,
        channel_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        text: Option<String>,
        has_media: bool,
    ) -> Self {
        Self {
            message_id,
            channel_name: channel_name.into(),
            timestamp,
            text,
            has_media,
            media_type: None,
            media_path: None,
        }
    }

    /// Mark the photo at `path` as downloaded for this message
    #[must_use]
    pub fn attach_photo(mut self, path: impl Into<String>) -> Self {
        self.has_media = true;
        self.media_type = Some(MediaType::Photo);
        self.media_path = Some(path.into());
        self
    }

    /// Check that `media_path` is set exactly when a photo was downloaded
    pub fn validate(&self) -> Result<()> {
        let photo = self.has_media && self.media_type == Some(MediaType::Photo);
        if self.media_path.is_some() != photo {
            return Err(PipelineError::InvalidInput(format!(
                "message {}: media_path must be present iff has_media and media_type=photo",
                self.message_id
            )));
        }
        Ok(())
    }

    /// UTC calendar day the message belongs to
    #[must_use]
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// A parsed log line together with its verbatim text
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Normalized fields extracted from the line
    pub record: MessageRecord,
    /// The line exactly as it appeared in the log file
    pub raw_data: String,
}

/// Half-open time window `[start, end)` of messages to scrape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    /// First instant included
    pub start: DateTime<Utc>,
    /// First instant excluded
    pub end: DateTime<Utc>,
}

impl RetentionWindow {
    /// Window spanning `[start, end)`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(PipelineError::InvalidInput(format!(
                "window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days leading up to `end`
    #[must_use]
    pub fn trailing_days(days: i64, end: DateTime<Utc>) -> Self {
        Self {
            start: end - Duration::days(days),
            end,
        }
    }

    /// True if `instant` falls inside the window
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Axis-aligned box in image pixel coordinates: top-left corner plus extents
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Convert two corner points `(x1, y1)`, `(x2, y2)` into origin + extents
    #[must_use]
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        }
    }
}

/// One detected object in one message image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Message the image belongs to
    pub message_id: i64,
    /// Channel of that message
    pub channel_name: String,
    /// Detected class label
    pub product_label: String,
    /// Detector confidence, unthresholded
    pub confidence: f64,
    /// Where the object sits in the image
    pub bounding_box: BoundingBox,
}

/// Raw message row that references a downloaded photo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoMessage {
    pub message_id: i64,
    pub channel_name: String,
    pub media_path: String,
}

/// A label and how often it was detected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    pub product_label: String,
    pub mention_count: i64,
}

/// A message matched by a text search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSearchHit {
    pub message_id: i64,
    pub channel_name: String,
    pub message_text: Option<String>,
    pub has_media: bool,
    pub media_type: Option<String>,
    pub media_path: Option<String>,
}

/// Number of messages a channel posted on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelActivity {
    /// ISO-8601 calendar date
    pub date: NaiveDate,
    pub message_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, hour, 0, 0).unwrap()
    }

    #[test]
    fn record_without_media_is_valid() {
        let record = MessageRecord::new(1, "demo", at(9), Some("hi".into()), false);
        assert!(record.validate().is_ok());
    }

    #[test]
    fn media_failure_keeps_has_media_but_no_path() {
        let record = MessageRecord::new(1, "demo", at(9), None, true);
        assert!(record.validate().is_ok());
        assert!(record.media_path.is_none());
    }

    #[test]
    fn path_without_photo_type_is_invalid() {
        let mut record = MessageRecord::new(1, "demo", at(9), None, true);
        record.media_path = Some("demo/images/1.jpg".into());
        assert!(record.validate().is_err());
    }

    #[test]
    fn photo_without_path_is_invalid() {
        let mut record = MessageRecord::new(1, "demo", at(9), None, true);
        record.media_type = Some(MediaType::Photo);
        assert!(record.validate().is_err());
    }

    #[test]
    fn serializes_timestamp_as_date() {
        let record = MessageRecord::new(7, "demo", at(9), None, true).attach_photo("demo/images/7.jpg");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["date"], "2024-05-02T09:00:00Z");
        assert_eq!(json["media_type"], "photo");
    }

    #[test]
    fn window_is_half_open() {
        let window = RetentionWindow::new(at(1), at(5)).unwrap();
        assert!(window.contains(at(1)));
        assert!(window.contains(at(4)));
        assert!(!window.contains(at(5)));
        assert!(RetentionWindow::new(at(5), at(1)).is_err());
    }

    #[test]
    fn trailing_window_spans_days() {
        let window = RetentionWindow::trailing_days(7, at(12));
        assert_eq!(window.end - window.start, Duration::days(7));
    }

    #[test]
    fn corners_become_origin_and_extents() {
        let bbox = BoundingBox::from_corners(10.0, 10.0, 50.0, 50.0);
        assert_eq!(
            bbox,
            BoundingBox {
                x: 10.0,
                y: 10.0,
                width: 40.0,
                height: 40.0
            }
        );
    }
}
