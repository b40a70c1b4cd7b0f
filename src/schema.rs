//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.
//! Raw tables are written by the pipeline; mart tables are rebuilt by the
//! transformation step and only read by the analytics queries.

/// Raw telegram messages, one row per loaded log line
pub mod telegram_messages {
    /// Table name
    pub const TABLE: &str = "telegram_messages";
    /// Message id within the channel
    pub const MESSAGE_ID: &str = "message_id";
    /// Channel name column
    pub const CHANNEL_NAME: &str = "channel_name";
    /// Message timestamp column
    pub const DATE: &str = "date";
    /// Message text column
    pub const TEXT: &str = "text";
    /// Flag indicating the message carried media
    pub const HAS_MEDIA: &str = "has_media";
    /// Downloaded media type column
    pub const MEDIA_TYPE: &str = "media_type";
    /// Downloaded media path column
    pub const MEDIA_PATH: &str = "media_path";
    /// Verbatim log line
    pub const RAW_DATA: &str = "raw_data";
}

/// Objects detected in message images
pub mod image_detections {
    /// Table name
    pub const TABLE: &str = "image_detections";
    /// Source message id
    pub const MESSAGE_ID: &str = "message_id";
    /// Source channel
    pub const CHANNEL_NAME: &str = "channel_name";
    /// Detected label column
    pub const PRODUCT_LABEL: &str = "product_label";
    /// Detector confidence column
    pub const CONFIDENCE: &str = "confidence";
    /// Bounding box JSON column
    pub const BOUNDING_BOX: &str = "bounding_box";
    /// Insertion timestamp column
    pub const DETECTED_AT: &str = "detected_at";
}

/// Channel dimension
pub mod dim_channels {
    pub const TABLE: &str = "dim_channels";
    pub const CHANNEL_ID: &str = "channel_id";
    pub const CHANNEL_NAME: &str = "channel_name";
}

/// Date dimension
pub mod dim_dates {
    pub const TABLE: &str = "dim_dates";
    pub const DATE_ID: &str = "date_id";
    pub const DATE: &str = "date";
}

/// Message fact table
pub mod fct_messages {
    pub const TABLE: &str = "fct_messages";
    pub const MESSAGE_ID: &str = "message_id";
    pub const CHANNEL_ID: &str = "channel_id";
    pub const DATE_ID: &str = "date_id";
    pub const MESSAGE_TEXT: &str = "message_text";
    pub const HAS_MEDIA: &str = "has_media";
    pub const MEDIA_TYPE: &str = "media_type";
    pub const MEDIA_PATH: &str = "media_path";
}
