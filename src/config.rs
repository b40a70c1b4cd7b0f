use anyhow::{anyhow, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub scraper: ScraperConfig,
    pub detection: DetectionConfig,
    pub transform: TransformConfig,
    pub api: ApiConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Base URL of the Telegram API gateway
    pub api_base: String,
    pub api_id: String,
    pub api_hash: String,
    pub phone: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub channels: Vec<String>,
    pub retention_days: i64,
    pub data_lake_path: String,
    pub page_size: usize,
    pub max_messages_per_channel: usize,
    /// Stop at the first message older than the window instead of filtering
    pub assume_ordered: bool,
    pub max_rate_limit_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    pub mode: String, // "builtin" or "command"
    pub command: Option<String>,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Six-field cron expression (with seconds), evaluated in UTC
    pub cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/warehouse.db".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
            },
            telegram: TelegramConfig {
                api_base: "http://localhost:8081".to_string(),
                api_id: String::new(),
                api_hash: String::new(),
                phone: None,
                request_timeout_secs: 30,
            },
            scraper: ScraperConfig {
                channels: vec![
                    "chemed123".to_string(),
                    "lobelia4cosmetics".to_string(),
                    "tikvahpharma".to_string(),
                ],
                retention_days: 7,
                data_lake_path: "data/raw/telegram_messages".to_string(),
                page_size: 100,
                max_messages_per_channel: 1000,
                assume_ordered: true,
                max_rate_limit_retries: 5,
            },
            detection: DetectionConfig {
                command: "yolo-detect".to_string(),
                args: vec!["--model".to_string(), "yolov8n.pt".to_string()],
            },
            transform: TransformConfig {
                mode: "builtin".to_string(),
                command: None,
                args: Vec::new(),
                working_dir: None,
            },
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            schedule: ScheduleConfig {
                cron: "0 0 6 * * *".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| anyhow!("Failed to build default configuration: {}", e))?;

        let config = Config::builder()
            // Start with default values
            .add_source(defaults)
            // Add config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix, e.g. TG_PIPELINE__API__PORT
            .add_source(
                Environment::with_prefix("TG_PIPELINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("scraper.channels")
                    .with_list_parse_key("detection.args")
                    .with_list_parse_key("transform.args"),
            )
            .build()
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;

        let mut app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.apply_legacy_env();

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Honour the plain variable names used by existing deployments
    fn apply_legacy_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(api_id) = std::env::var("TELEGRAM_API_ID") {
            self.telegram.api_id = api_id;
        }
        if let Ok(api_hash) = std::env::var("TELEGRAM_API_HASH") {
            self.telegram.api_hash = api_hash;
        }
        if let Ok(phone) = std::env::var("TELEGRAM_PHONE") {
            self.telegram.phone = Some(phone);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.max_connections == 0 {
            return Err(anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow!("connection_timeout_secs must be greater than 0"));
        }
        if self.database_path().as_os_str().is_empty() {
            return Err(anyhow!("database.url must name a file"));
        }

        if self.telegram.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be greater than 0"));
        }

        // Validate scraper config
        if self.scraper.channels.is_empty() {
            return Err(anyhow!("scraper.channels must list at least one channel"));
        }
        for channel in &self.scraper.channels {
            InputValidator::validate_channel_name(channel)?;
        }
        if self.scraper.retention_days <= 0 {
            return Err(anyhow!("retention_days must be greater than 0"));
        }
        if self.scraper.page_size == 0 {
            return Err(anyhow!("page_size must be greater than 0"));
        }
        if self.scraper.max_messages_per_channel == 0 {
            return Err(anyhow!("max_messages_per_channel must be greater than 0"));
        }

        if self.detection.command.trim().is_empty() {
            return Err(anyhow!("detection.command cannot be empty"));
        }

        // Validate transform config
        match self.transform.mode.as_str() {
            "builtin" => {}
            "command" => {
                if self.transform.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                    return Err(anyhow!("transform.command is required when transform.mode is 'command'"));
                }
            }
            other => {
                return Err(anyhow!(
                    "Invalid transform mode: {}. Must be one of: [\"builtin\", \"command\"]",
                    other
                ));
            }
        }

        cron::Schedule::from_str(&self.schedule.cron)
            .map_err(|e| anyhow!("Invalid cron expression '{}': {}", self.schedule.cron, e))?;

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        Ok(())
    }

    /// Filesystem path of the warehouse database, with any `sqlite:` scheme removed
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        let url = self.database.url.as_str();
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        PathBuf::from(path)
    }

    /// Parsed pipeline schedule
    pub fn cron_schedule(&self) -> Result<cron::Schedule> {
        cron::Schedule::from_str(&self.schedule.cron)
            .map_err(|e| anyhow!("Invalid cron expression '{}': {}", self.schedule.cron, e))
    }
}

impl ApiConfig {
    /// Address the analytics API binds to
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
