//! Local HTTP API.
//!
//! Re-exposes a few Protect calls to the frontend running in the browser:
//!
//! - `GET /api/health` - service health check
//! - `GET /snapshot/{doorbell_id}` - current JPEG from the doorbell camera
//! - `POST /message/set` - show a message on the doorbell's LCD
//! - `GET /message/templates` - canned messages from the configuration
//!
//! ## Error Handling
//!
//! Errors are returned as `{"error": "..."}` via [`AppError`]. A 4xx from the
//! appliance is passed through with its status; anything else is a 500.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use chime_core::UnifiClient;

use crate::server::ServeToken;

/// Shared state for API handlers.
#[derive(Debug)]
pub struct ApiState {
    pub client: Arc<UnifiClient>,
    pub templates: Vec<String>,
}

impl ApiState {
    pub fn new(client: Arc<UnifiClient>, templates: Vec<String>) -> Arc<Self> {
        Arc::new(Self { client, templates })
    }
}

/// Create the API router.
pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/snapshot/{doorbell_id}", get(snapshot))
        .route("/message/set", post(set_message))
        .route("/message/templates", get(message_templates))
}

/// The API router with state, request tracing and permissive CORS.
pub fn app(state: Arc<ApiState>) -> Router {
    router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

async fn snapshot(
    State(state): State<Arc<ApiState>>,
    ServeToken(cancel): ServeToken,
    Path(doorbell_id): Path<String>,
) -> Result<Response, AppError> {
    let image: Bytes = state.client.snapshot(&cancel, &doorbell_id).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], image).into_response())
}

fn default_duration_sec() -> u64 {
    30
}

/// Body of `POST /message/set`.
#[derive(Debug, Deserialize)]
pub struct SetMessageRequest {
    pub doorbell_id: String,
    pub message: String,
    /// How long the message stays on the LCD.
    #[serde(default = "default_duration_sec")]
    pub duration_sec: u64,
}

async fn set_message(
    State(state): State<Arc<ApiState>>,
    ServeToken(cancel): ServeToken,
    Json(param): Json<SetMessageRequest>,
) -> Result<StatusCode, AppError> {
    if param.doorbell_id.is_empty() {
        return Err(AppError::BadRequest("doorbell_id cannot be empty".to_string()));
    }

    state
        .client
        .set_message(
            &cancel,
            &param.doorbell_id,
            &param.message,
            Duration::from_secs(param.duration_sec),
        )
        .await?;

    Ok(StatusCode::CREATED)
}

/// Response of `GET /message/templates`.
#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub templates: Vec<String>,
}

async fn message_templates(State(state): State<Arc<ApiState>>) -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: state.templates.clone(),
    })
}

/// API errors.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Upstream(chime_core::Error),
}

impl From<chime_core::Error> for AppError {
    fn from(e: chime_core::Error) -> Self {
        AppError::Upstream(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Upstream(e) => {
                let passthrough = e
                    .http_status()
                    .filter(|s| (400..500).contains(s))
                    .and_then(|s| StatusCode::from_u16(s).ok());
                match passthrough {
                    Some(status) => {
                        warn!("{}", e);
                        (status, e.to_string())
                    }
                    None => {
                        if e.http_status().is_some_and(|s| s >= 500) {
                            warn!("{}", e);
                        } else {
                            error!("{}", e);
                        }
                        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                    }
                }
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
