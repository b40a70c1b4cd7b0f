//! Where channel messages come from.
//!
//! The scraper talks to a [`ChannelSource`]. [`GatewaySource`] is the
//! production implementation: a JSON-over-HTTP client for a Telegram API
//! gateway that holds the MTProto session. Gateway endpoints:
//!
//! - `GET {api_base}/channels/{channel}/messages?offset_date=..&offset_id=..&limit=..`
//!   returns up to `limit` messages older than the offset, newest first.
//! - `GET {api_base}/channels/{channel}/messages/{id}/photo` returns the
//!   photo bytes.
//!
//! A `429` response carries `Retry-After` in seconds.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response, StatusCode};
use serde::Deserialize;

use crate::config::TelegramConfig;
use crate::error::SourceError;

/// Used when a 429 arrives without a usable `Retry-After` header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// A message as reported by the source, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub text: Option<String>,
    /// True if the message carries media of any kind
    pub has_media: bool,
    /// True if that media is a photo we can download
    pub has_photo: bool,
}

/// Paged, reverse-chronological access to channel history
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Up to `limit` messages posted before `offset_date`, newest first.
    ///
    /// When `offset_id` is set only messages with a smaller id are returned,
    /// which lets callers continue from the last message they saw.
    async fn fetch_page(
        &self,
        channel: &str,
        offset_date: DateTime<Utc>,
        offset_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError>;

    /// Download the photo attached to `message` to `dest`
    async fn download_photo(
        &self,
        channel: &str,
        message: &SourceMessage,
        dest: &Path,
    ) -> Result<(), SourceError>;
}

#[derive(Debug, Deserialize)]
struct GatewayPage {
    messages: Vec<GatewayMessage>,
}

#[derive(Debug, Deserialize)]
struct GatewayMessage {
    id: i64,
    date: DateTime<Utc>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    media: Option<GatewayMedia>,
}

#[derive(Debug, Deserialize)]
struct GatewayMedia {
    #[serde(rename = "type")]
    kind: String,
}

impl From<GatewayMessage> for SourceMessage {
    fn from(message: GatewayMessage) -> Self {
        let has_photo = message.media.as_ref().is_some_and(|m| m.kind == "photo");
        Self {
            id: message.id,
            date: message.date,
            // The gateway reports media-only posts with an empty caption
            text: message.text.filter(|t| !t.is_empty()),
            has_media: message.media.is_some(),
            has_photo,
        }
    }
}

/// HTTP client for the Telegram API gateway
#[derive(Debug, Clone)]
pub struct GatewaySource {
    client: Client,
    api_base: String,
    api_id: String,
    api_hash: String,
    phone: Option<String>,
}

impl GatewaySource {
    pub fn new(config: &TelegramConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_id: config.api_id.clone(),
            api_hash: config.api_hash.clone(),
            phone: config.phone.clone(),
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("x-api-id", &self.api_id)
            .header("x-api-hash", &self.api_hash);
        match &self.phone {
            Some(phone) => request.header("x-phone", phone),
            None => request,
        }
    }

    /// Map gateway status codes onto the source error taxonomy
    async fn check(channel: &str, response: Response) -> Result<Response, SourceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map_or(DEFAULT_RETRY_AFTER, Duration::from_secs);
                Err(SourceError::RateLimited { retry_after })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(SourceError::Unauthorized(format!("HTTP {status}: {body}")))
            }
            StatusCode::NOT_FOUND => Err(SourceError::ChannelNotFound(channel.to_string())),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SourceError::Request(format!("HTTP {status}: {body}")))
            }
        }
    }
}

#[async_trait]
impl ChannelSource for GatewaySource {
    async fn fetch_page(
        &self,
        channel: &str,
        offset_date: DateTime<Utc>,
        offset_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel);
        let mut query = vec![
            ("offset_date", offset_date.to_rfc3339()),
            ("limit", limit.to_string()),
        ];
        if let Some(id) = offset_id {
            query.push(("offset_id", id.to_string()));
        }

        let response = self.get(&url).query(&query).send().await?;
        let page: GatewayPage = Self::check(channel, response).await?.json().await?;
        Ok(page.messages.into_iter().map(SourceMessage::from).collect())
    }

    async fn download_photo(
        &self,
        channel: &str,
        message: &SourceMessage,
        dest: &Path,
    ) -> Result<(), SourceError> {
        let url = format!("{}/channels/{}/messages/{}/photo", self.api_base, channel, message.id);
        let response = self.get(&url).send().await?;
        let bytes = Self::check(channel, response).await?.bytes().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SourceError::Request(format!("cannot create {}: {e}", parent.display())))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| SourceError::Request(format!("cannot write {}: {e}", dest.display())))?;
        Ok(())
    }
}
