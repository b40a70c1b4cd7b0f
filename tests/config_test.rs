//! Integration tests for config.rs module

use std::path::PathBuf;

use telegram_pipeline::config::AppConfig;

#[test]
fn test_default_config_values() {
    let config = AppConfig::default();

    assert_eq!(config.database.url, "sqlite:data/warehouse.db");
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.database.connection_timeout_secs, 30);
    assert_eq!(config.api.port, 8000);
    assert_eq!(config.schedule.cron, "0 0 6 * * *");
}

#[test]
fn test_default_scraper_config() {
    let config = AppConfig::default();

    assert_eq!(
        config.scraper.channels,
        vec!["chemed123", "lobelia4cosmetics", "tikvahpharma"]
    );
    assert_eq!(config.scraper.retention_days, 7);
    assert_eq!(config.scraper.data_lake_path, "data/raw/telegram_messages");
    assert_eq!(config.scraper.max_messages_per_channel, 1000);
    assert!(config.scraper.assume_ordered);
}

#[test]
fn test_validation_rejects_zero_pool() {
    let mut config = AppConfig::default();
    config.database.max_connections = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_bad_channel_names() {
    let mut config = AppConfig::default();
    config.scraper.channels = vec!["../etc".to_string()];
    assert!(config.validate().is_err());

    config.scraper.channels = Vec::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_non_positive_retention() {
    let mut config = AppConfig::default();
    config.scraper.retention_days = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_bad_cron() {
    let mut config = AppConfig::default();
    config.schedule.cron = "every morning".to_string();
    assert!(config.validate().is_err());
    assert!(config.cron_schedule().is_err());
}

#[test]
fn test_validation_rejects_unknown_log_level_and_format() {
    let mut config = AppConfig::default();
    config.logging.level = "loud".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_command_transform_requires_command() {
    let mut config = AppConfig::default();
    config.transform.mode = "command".to_string();
    assert!(config.validate().is_err());

    config.transform.command = Some("dbt".to_string());
    assert!(config.validate().is_ok());

    config.transform.mode = "spark".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_cron_schedule_has_upcoming_runs() {
    let config = AppConfig::default();
    let schedule = config.cron_schedule().unwrap();
    assert!(schedule.upcoming(chrono::Utc).next().is_some());
}

#[test]
fn test_bind_address_and_database_path() {
    let mut config = AppConfig::default();
    config.api.host = "127.0.0.1".to_string();
    config.api.port = 9000;
    assert_eq!(config.api.bind_address(), "127.0.0.1:9000");

    config.database.url = "sqlite://var/lib/pipeline.db".to_string();
    assert_eq!(config.database_path(), PathBuf::from("var/lib/pipeline.db"));
}

#[test]
fn test_config_serialization() {
    let config = AppConfig::default();
    let json = serde_json::to_string(&config).unwrap();
    let back: AppConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.scraper.channels, config.scraper.channels);
    assert_eq!(back.detection.args, config.detection.args);
}
