//! Telegram Pipeline - Channel Ingestion, Enrichment and Analytics
//!
//! A Rust library for pulling public Telegram channel posts into a local
//! warehouse, tagging their photos with an object detector and answering
//! simple analytics questions over HTTP.
//!
//! # Features
//!
//! - Scrape channels into an append-only JSON-lines data lake
//! - Load the data lake into raw warehouse tables
//! - Rebuild dimensional marts from the raw tables
//! - Detect objects in downloaded photos
//! - Serve top products, message search and channel activity
//! - Run the whole pipeline on a cron schedule

/// Analytics queries over the marts
pub mod analytics;
/// HTTP analytics API
pub mod api;
/// Configuration management
pub mod config;
/// Raw JSON-lines storage layout
pub mod data_lake;
/// Database operations and connection pooling
pub mod db;
/// Object detection capability
pub mod detection;
/// Photo enrichment with detections
pub mod enricher;
/// Error types
pub mod error;
/// Data lake to warehouse loading
pub mod loader;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Step sequencing and scheduling
pub mod pipeline;
/// Database schema definitions
pub mod schema;
/// Channel scraping
pub mod scraper;
/// Message sources
pub mod source;
/// Mart refresh
pub mod transform;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use analytics::{Analytics, TopLimit};
pub use config::AppConfig;
pub use db::Database;
pub use error::{PipelineError, Result, SourceError};
pub use models::{DetectionRecord, MessageRecord, RetentionWindow};
pub use pipeline::Pipeline;
