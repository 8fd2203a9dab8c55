//! HTTP server for blob cache endpoints
//!
//! Provides /health, /blobs, /paths and /clear endpoints over one cache.

use crate::error::AppError;
use crate::types::{DeleteResponse, HealthResponse, PrefixQuery, PutResponse};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tiered_blob_cache::{Cache, ContentHash, WriteMode};
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: Cache,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: Cache) -> Self {
        Self {
            cache,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/blobs", put(put_blob))
        .route("/blobs/{hash}", get(get_blob))
        .route("/paths", axum::routing::delete(delete_prefix))
        .route("/paths/{*path}", get(get_path).delete(delete_path))
        .route("/clear", post(clear))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server, returning once `shutdown` resolves
pub async fn start_server(
    state: SharedState,
    port: u16,
    max_body_bytes: usize,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let router = create_router(state, max_body_bytes);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_stats = state.cache.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        durable: state.cache.has_durable(),
        cache: cache_stats,
    })
}

/// Parameters of `PUT /blobs`: any number of `path=` plus an optional `wait=true`
#[derive(Debug, Default, PartialEq)]
struct PutParams {
    paths: Vec<String>,
    wait: bool,
}

fn parse_put_params(query: Option<&str>) -> PutParams {
    let mut params = PutParams::default();
    let Some(query) = query else {
        return params;
    };

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "path" => params.paths.push(value.into_owned()),
            "wait" => params.wait = matches!(value.as_ref(), "true" | "1"),
            _ => {}
        }
    }
    params
}

/// Store the request body and map any given paths onto it
async fn put_blob(
    State(state): State<SharedState>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Json<PutResponse>, AppError> {
    let params = parse_put_params(query.as_deref());
    let paths: Vec<&str> = params.paths.iter().map(String::as_str).collect();
    let mode = if params.wait {
        WriteMode::WaitForDurable
    } else {
        WriteMode::Background
    };

    let hash = state.cache.put(&body, &paths, mode).await?;
    debug!(hash = %hash, size = body.len(), paths = paths.len(), "Stored blob");
    Ok(Json(PutResponse { hash }))
}

/// Get a blob by content hash
async fn get_blob(
    State(state): State<SharedState>,
    Path(hash): Path<String>,
) -> Result<Response, AppError> {
    let hash = ContentHash::parse(&hash)?;
    let data = state.cache.get_by_hash(&hash).await?;
    Ok(blob_response(&hash, data))
}

/// Get a blob by path
async fn get_path(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let data = state.cache.get_by_path(&path).await?;
    let hash = ContentHash::of(&data);
    Ok(blob_response(&hash, data))
}

async fn delete_path(
    State(state): State<SharedState>,
    Path(path): Path<String>,
) -> Result<StatusCode, AppError> {
    state.cache.delete_by_path(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_prefix(
    State(state): State<SharedState>,
    Query(query): Query<PrefixQuery>,
) -> Result<Json<DeleteResponse>, AppError> {
    let removed = state.cache.delete_by_path_start(&query.prefix).await?;
    Ok(Json(DeleteResponse { removed }))
}

async fn clear(State(state): State<SharedState>) -> Result<StatusCode, AppError> {
    state.cache.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

fn blob_response(hash: &ContentHash, data: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::ETAG, format!("\"{}\"", hash)),
        ],
        data,
    )
        .into_response()
}
