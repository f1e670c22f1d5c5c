use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, Json, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tracing::{debug, error, info, warn};

use crate::basemap::Basemap;
use crate::config::MapConfig;
use crate::error::MapError;
use crate::handler::{MapHandler, Update};
use crate::models::{ErrorBody, MapUpdateRequest};
use crate::notebook::FRAME_ANCESTORS;
use crate::template_engine::TemplateEngine;

/// Which page `/` serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Dashboard,
    Notebook { url: String, running: bool },
}

pub struct AppState {
    pub handler: MapHandler,
    pub templates: Arc<TemplateEngine>,
    pub map: MapConfig,
    pub page: Page,
}

/// Request bodies above this are answered with 413 unless configured otherwise.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// `max_body_bytes` caps the JSON body of `/api/map`, which carries uploads
/// as base64 data URLs.
pub fn router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/map.html", get(last_map))
        .route("/api/map", post(update_map))
        .route("/api/basemaps", get(list_basemaps))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(frame_policy))
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

/// One line per request, written once the response is known.
async fn access_log(req: Request<axum::body::Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let response = next.run(req).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        warn!(%method, %path, status = status.as_u16(), elapsed_ms, "request failed");
    } else {
        info!(%method, %path, status = status.as_u16(), elapsed_ms, "request");
    }
    response
}

async fn frame_policy(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(FRAME_ANCESTORS),
    );
    response
}

// --- Handlers ---

pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    let rendered = match &state.page {
        Page::Dashboard => render_dashboard(&state.templates, &state.map),
        Page::Notebook { url, running } => render_notebook_page(&state.templates, url, *running),
    };
    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("page render error: {}", e);
            e.into_response()
        }
    }
}

pub async fn update_map(State(state): State<Arc<AppState>>, Json(req): Json<MapUpdateRequest>) -> Response {
    let (trigger, params) = match req.into_parts() {
        Ok(parts) => parts,
        Err(e) => {
            warn!("rejected map request: {}", e);
            return e.into_response();
        }
    };

    let result = tokio::task::spawn_blocking(move || state.handler.handle(trigger, &params)).await;
    match result {
        Ok(Ok(Update::Document(doc))) => Html(doc.into_string()).into_response(),
        Ok(Ok(Update::NoUpdate)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => {
            warn!("map update failed: {}", e);
            e.into_response()
        }
        Err(e) => {
            error!("map update task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "map update failed").into_response()
        }
    }
}

pub async fn last_map(State(state): State<Arc<AppState>>) -> Response {
    match state.handler.last_document() {
        Ok(Some(html)) => Html(html).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, "no map rendered yet").into_response(),
        Err(e) => {
            error!("reading last map: {}", e);
            e.into_response()
        }
    }
}

pub async fn list_basemaps() -> Json<Vec<&'static str>> {
    Json(Basemap::ALL.iter().map(|b| b.id()).collect())
}

async fn health() -> &'static str {
    "ok"
}

// --- Helper Functions ---

pub fn render_dashboard(templates: &TemplateEngine, map: &MapConfig) -> Result<String, MapError> {
    let basemaps: Vec<&str> = Basemap::ALL.iter().map(|b| b.id()).collect();
    let mut ctx = tera::Context::new();
    ctx.insert("title", "Map Dashboard");
    ctx.insert("basemaps", &basemaps);
    ctx.insert("default_basemap", &map.default_basemap);
    ctx.insert("default_left", &map.default_left);
    ctx.insert("default_right", &map.default_right);
    templates.render("dashboard.html", &ctx)
}

pub fn render_notebook_page(templates: &TemplateEngine, url: &str, running: bool) -> Result<String, MapError> {
    let mut ctx = tera::Context::new();
    ctx.insert("title", "Interactive Jupyter Notebook");
    ctx.insert("notebook_url", url);
    ctx.insert("running", &running);
    ctx.insert("csp", FRAME_ANCESTORS);
    templates.render("notebook.html", &ctx)
}

fn status_for(e: &MapError) -> (StatusCode, &'static str) {
    match e {
        MapError::UnknownBasemap(_) => (StatusCode::UNPROCESSABLE_ENTITY, "unknown_basemap"),
        MapError::UnsupportedFileType(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_file_type"),
        MapError::InvalidGeoJson { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_geojson"),
        MapError::InvalidUpload(_) => (StatusCode::BAD_REQUEST, "invalid_upload"),
        MapError::MissingParameter(_) => (StatusCode::BAD_REQUEST, "missing_parameter"),
        MapError::Template(_) => (StatusCode::INTERNAL_SERVER_ERROR, "template"),
        MapError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io"),
    }
}

impl IntoResponse for MapError {
    fn into_response(self) -> Response {
        let (status, kind) = status_for(&self);
        debug!("responding {} ({})", status, kind);
        let body = ErrorBody {
            error: self.to_string(),
            kind: kind.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
