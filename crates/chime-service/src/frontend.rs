//! Frontend server.
//!
//! Serves the browser frontend and tells it where the local API lives.
//! Client-side routes such as `/ringing/{id}` have no file behind them, so
//! unknown paths without an extension (or ending in `.html`) get
//! `index.html`. Other misses are 404.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state for frontend handlers.
#[derive(Debug, Clone)]
pub struct FrontendState {
    pub api_port: u16,
    pub static_dir: Option<PathBuf>,
}

/// Response of `GET /.well-known/configuration`.
#[derive(Debug, Serialize)]
pub struct WellKnownConfiguration {
    pub api_endpoint: String,
}

/// Create the frontend router.
pub fn app(api_port: u16, static_dir: Option<PathBuf>) -> Router {
    if let Some(dir) = &static_dir {
        if dir.is_dir() {
            info!("Serving static files from: {:?}", dir);
        } else {
            warn!("Static directory {:?} does not exist", dir);
        }
    }

    let state = Arc::new(FrontendState {
        api_port,
        static_dir,
    });

    Router::new()
        .route("/.well-known/configuration", get(well_known_configuration))
        .fallback(serve_static)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn well_known_configuration(
    State(state): State<Arc<FrontendState>>,
) -> Json<WellKnownConfiguration> {
    Json(WellKnownConfiguration {
        api_endpoint: format!("http://127.0.0.1:{}", state.api_port),
    })
}

/// Whether a missed path should get the single-page app shell.
fn wants_index(path: &str) -> bool {
    FsPath::new(path)
        .extension()
        .is_none_or(|ext| ext == "html")
}

async fn serve_static(State(state): State<Arc<FrontendState>>, request: Request) -> Response {
    let path = request.uri().path().to_string();

    let Some(dir) = state.static_dir.as_deref() else {
        warn!("{} is not found", path);
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Ok(response) = ServeDir::new(dir).oneshot(request).await
        && response.status() != StatusCode::NOT_FOUND
    {
        return response.map(Body::new);
    }

    if wants_index(&path)
        && let Ok(index) = tokio::fs::read(dir.join("index.html")).await
    {
        return ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], index).into_response();
    }

    warn!("{} is not found", path);
    StatusCode::NOT_FOUND.into_response()
}
