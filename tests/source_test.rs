//! Tests for the HTTP gateway source against a mock gateway

use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use telegram_pipeline::config::TelegramConfig;
use telegram_pipeline::error::SourceError;
use telegram_pipeline::source::{ChannelSource, GatewaySource, SourceMessage};

fn config(base: String) -> TelegramConfig {
    TelegramConfig {
        api_base: base,
        api_id: "12345".to_string(),
        api_hash: "hash".to_string(),
        phone: Some("+251900000000".to_string()),
        request_timeout_secs: 5,
    }
}

#[tokio::test]
async fn test_fetch_page_parses_messages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/demo/messages"))
        .and(header("x-api-id", "12345"))
        .and(header("x-api-hash", "hash"))
        .and(query_param("limit", "2"))
        .and(query_param("offset_id", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messages": [
                {"id": 9, "date": "2024-05-03T09:00:00Z", "text": "Vitamin C in stock", "media": null},
                {"id": 8, "date": "2024-05-03T08:00:00Z", "text": "", "media": {"type": "photo"}},
                {"id": 7, "date": "2024-05-02T08:00:00Z", "media": {"type": "document"}}
            ]
        })))
        .mount(&server)
        .await;

    let source = GatewaySource::new(&config(server.uri())).unwrap();
    let offset = Utc.with_ymd_and_hms(2024, 5, 4, 0, 0, 0).unwrap();
    let page = source.fetch_page("demo", offset, Some(10), 2).await.unwrap();

    assert_eq!(page.len(), 3);
    assert_eq!(page[0].text.as_deref(), Some("Vitamin C in stock"));
    assert!(!page[0].has_media);
    // Empty captions on media posts become no text
    assert_eq!(page[1].text, None);
    assert!(page[1].has_photo);
    assert!(page[2].has_media);
    assert!(!page[2].has_photo);
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/demo/messages"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
        .mount(&server)
        .await;

    let source = GatewaySource::new(&config(server.uri())).unwrap();
    let err = source.fetch_page("demo", Utc::now(), None, 100).await.unwrap_err();
    match err {
        SourceError::RateLimited { retry_after } => assert_eq!(retry_after, Duration::from_secs(17)),
        other => panic!("expected rate limit, got {other:?}"),
    }
}

#[tokio::test]
async fn test_auth_and_missing_channel_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/private/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("AUTH_KEY_UNREGISTERED"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels/gone/messages"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/channels/flaky/messages"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let source = GatewaySource::new(&config(server.uri())).unwrap();
    assert!(matches!(
        source.fetch_page("private", Utc::now(), None, 1).await,
        Err(SourceError::Unauthorized(_))
    ));
    assert!(matches!(
        source.fetch_page("gone", Utc::now(), None, 1).await,
        Err(SourceError::ChannelNotFound(_))
    ));
    assert!(matches!(
        source.fetch_page("flaky", Utc::now(), None, 1).await,
        Err(SourceError::Request(_))
    ));
}

#[tokio::test]
async fn test_download_photo_writes_bytes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/channels/demo/messages/8/photo"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xd8, 0xff]))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("demo").join("images").join("8.jpg");
    let message = SourceMessage {
        id: 8,
        date: Utc::now(),
        text: None,
        has_media: true,
        has_photo: true,
    };

    let source = GatewaySource::new(&config(server.uri())).unwrap();
    source.download_photo("demo", &message, &dest).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), vec![0xff, 0xd8, 0xff]);
}
