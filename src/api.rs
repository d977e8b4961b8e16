//! Read-only HTTP API for reporting clients.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::aggregation::AggregationEngine;
use crate::config::ServerConfig;
use crate::error::SentimentError;
use crate::models::{Channel, ProtocolStats, StoredMessage, User};
use crate::repository::SentimentRepository;
use crate::validation::InputValidator;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    repo: Arc<dyn SentimentRepository>,
    aggregation: AggregationEngine,
    default_limit: u32,
    max_limit: u32,
}

impl ApiState {
    pub fn new(repo: Arc<dyn SentimentRepository>, server: &ServerConfig) -> Self {
        Self {
            aggregation: AggregationEngine::new(Arc::clone(&repo)),
            repo,
            default_limit: server.default_message_limit,
            max_limit: server.max_message_limit,
        }
    }
}

/// Handler error, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<SentimentError> for ApiError {
    fn from(err: SentimentError) -> Self {
        error!("Request failed: {err}");
        Self::Internal
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    #[serde(rename = "windowDays", alias = "window_days")]
    pub window_days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub users: usize,
    pub channels: usize,
    pub messages: usize,
}

/// Build the router with CORS and request tracing applied by the caller
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/protocols", get(list_protocols))
        .route("/protocols/{name}/sentiment", get(protocol_sentiment))
        .route("/channels", get(list_channels))
        .route("/channels/{id}/messages", get(channel_messages))
        .route("/users", get(list_users))
        .route("/messages", get(recent_messages))
        .with_state(state)
}

impl ApiState {
    fn limit(&self, requested: Option<u32>) -> Result<u32, ApiError> {
        InputValidator::validate_limit(requested.unwrap_or(self.default_limit), self.max_limit)
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

async fn health(State(state): State<ApiState>) -> ApiResult<HealthResponse> {
    let stats = state.repo.get_storage_stats().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        users: stats.users,
        channels: stats.channels,
        messages: stats.messages,
    }))
}

async fn list_protocols(State(state): State<ApiState>) -> ApiResult<Vec<String>> {
    Ok(Json(state.repo.get_protocol_names().await?))
}

async fn protocol_sentiment(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult<ProtocolStats> {
    let Query(query) = query?;
    InputValidator::validate_protocol_name(&name).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let window_days = query
        .window_days
        .map(InputValidator::validate_window_days)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    state
        .aggregation
        .aggregate(&name, window_days)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No messages found for protocol {name}")))
}

async fn list_channels(State(state): State<ApiState>) -> ApiResult<Vec<Channel>> {
    Ok(Json(state.repo.get_channels().await?))
}

async fn channel_messages(
    State(state): State<ApiState>,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Vec<StoredMessage>> {
    let Path(id) = path?;
    let Query(query) = query?;
    let limit = state.limit(query.limit)?;

    if state.repo.get_channel(id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Channel {id} not found")));
    }
    Ok(Json(state.repo.get_channel_messages(id, limit).await?))
}

async fn list_users(State(state): State<ApiState>) -> ApiResult<Vec<User>> {
    Ok(Json(state.repo.get_users().await?))
}

async fn recent_messages(
    State(state): State<ApiState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Vec<StoredMessage>> {
    let Query(query) = query?;
    let limit = state.limit(query.limit)?;
    Ok(Json(state.repo.get_recent_messages(limit).await?))
}
