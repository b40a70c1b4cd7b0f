//! HTTP surface of the analytics facade.
//!
//! All endpoints are read-only. Queries run on the blocking pool because the
//! warehouse driver is synchronous. Storage failures are logged and reported
//! to clients with a generic message.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::analytics::{Analytics, TopLimit};
use crate::config::ApiConfig;
use crate::error::{PipelineError, Result};
use crate::metrics;
use crate::models::{ChannelActivity, MessageSearchHit, TopProduct};

/// Shared state handed to every handler
pub struct AppState {
    pub analytics: Analytics,
}

/// Error returned by handlers, rendered as `{"detail": ...}`
#[derive(Debug)]
pub enum ApiError {
    /// The request was well-formed but a value is out of range
    Unprocessable(String),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Unprocessable(detail) => (StatusCode::UNPROCESSABLE_ENTITY, detail),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Extension trait for logging errors before turning them into an `ApiError`
pub trait LogErr<T> {
    /// Log error with context; invalid input becomes 422, anything else 500
    fn log_err(self, context: &str) -> std::result::Result<T, ApiError>;
}

impl<T> LogErr<T> for Result<T> {
    fn log_err(self, context: &str) -> std::result::Result<T, ApiError> {
        self.map_err(|e| match e {
            PipelineError::InvalidInput(detail) => ApiError::Unprocessable(detail),
            other => {
                error!(error = %other, "{context}");
                ApiError::Internal
            }
        })
    }
}

/// Run an analytics query on the blocking pool
async fn query<T, F>(state: &AppState, context: &str, f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce(&Analytics) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let analytics = state.analytics.clone();
    tokio::task::spawn_blocking(move || f(&analytics))
        .await
        .map_err(PipelineError::from)
        .and_then(|result| result)
        .log_err(context)
}

/// Build the analytics router
pub fn router(analytics: Analytics) -> Router {
    let state = Arc::new(AppState { analytics });
    Router::new()
        .route("/api/reports/top-products", get(top_products))
        .route("/api/search/messages", get(search_messages))
        .route("/api/channels/{channel_name}/activity", get(channel_activity))
        .route("/channels/", get(list_channels))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind to the configured address and serve until Ctrl-C
pub async fn serve(config: &ApiConfig, analytics: Analytics) -> anyhow::Result<()> {
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, "Analytics API listening");

    axum::serve(listener, router(analytics))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down analytics API");
        })
        .await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
struct TopProductsParams {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
}

async fn top_products(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopProductsParams>,
) -> std::result::Result<Json<Vec<TopProduct>>, ApiError> {
    metrics::record_api_request("top_products");
    // Reject out-of-range limits before touching storage
    let limit = params
        .limit
        .map_or_else(|| Ok(TopLimit::default()), TopLimit::new)
        .log_err("Invalid limit")?;

    let products = query(&state, "Failed to fetch top products", move |a| a.top_products(limit)).await?;
    Ok(Json(products))
}

async fn search_messages(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> std::result::Result<Json<Vec<MessageSearchHit>>, ApiError> {
    metrics::record_api_request("search_messages");
    let hits = query(&state, "Failed to search messages", move |a| {
        a.search_messages(&params.query)
    })
    .await?;
    Ok(Json(hits))
}

async fn channel_activity(
    State(state): State<Arc<AppState>>,
    Path(channel_name): Path<String>,
) -> std::result::Result<Json<Vec<ChannelActivity>>, ApiError> {
    metrics::record_api_request("channel_activity");
    let activity = query(&state, "Failed to fetch channel activity", move |a| {
        a.channel_activity(&channel_name)
    })
    .await?;
    Ok(Json(activity))
}

async fn list_channels(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<Vec<String>>, ApiError> {
    metrics::record_api_request("list_channels");
    let channels = query(&state, "Failed to list channels", Analytics::list_channels).await?;
    Ok(Json(channels))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
