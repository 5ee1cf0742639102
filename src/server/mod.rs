//! HTTP interface to the draft store
//!
//! ```text
//! POST   /drafts                 {payload}  -> 201 {id, updatedAt, checksum}
//! PUT    /drafts/{id}            {payload}  -> 200 {checksum, updatedAt} | 403 | 404
//! GET    /drafts/{id}                       -> 200 {id, payload, updatedAt, checksum} | 403 | 404
//! DELETE /drafts/{id}                       -> 200 | 403 | 404
//! GET    /drafts/session/latest             -> 200 {id, payload, updatedAt, checksum} | 204
//! GET    /healthz                           -> 200
//! ```
//!
//! Every draft route is scoped by the caller's session credential (see
//! [`session`]). Store calls are blocking I/O and run on the blocking pool.

use crate::config::Config;
use crate::error::{kind_of, MetadraftError, Result};
use crate::payload::Document;
use crate::store::DraftStore;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub mod session;

use session::SessionOwner;

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Draft store shared by all requests
    pub store: Arc<DraftStore>,
    /// Name of the session cookie
    pub session_cookie: String,
}

/// Body of create and update requests.
#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    /// Form snapshot; must be a JSON object
    #[serde(default)]
    pub payload: Value,
}

/// Handler error, rendered as `{"error": "..."}` with a mapped status.
#[derive(Debug)]
pub enum ApiError {
    /// Failure reported by the store or session layer
    Store(anyhow::Error),
    /// Request body could not be read as JSON
    Body(JsonRejection),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Store(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Body(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ApiError::Body(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(err) => match kind_of(err) {
                Some(MetadraftError::InvalidPayload(_)) => StatusCode::BAD_REQUEST,
                Some(MetadraftError::Unauthenticated) => StatusCode::UNAUTHORIZED,
                Some(MetadraftError::Ownership(_)) => StatusCode::FORBIDDEN,
                Some(MetadraftError::NotFound(_)) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Body(rejection) => rejection.body_text(),
            ApiError::Store(_) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                "internal storage error".to_string()
            }
            ApiError::Store(err) => err.to_string(),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            if let ApiError::Store(err) = &self {
                tracing::error!(error = %format!("{:#}", err), "Draft request failed");
            }
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Build the router for `state`.
pub fn router(state: AppState, max_payload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/drafts", post(create_draft))
        .route("/drafts/session/latest", get(latest_draft))
        .route(
            "/drafts/:id",
            get(get_draft).put(update_draft).delete(delete_draft),
        )
        .layer(DefaultBodyLimit::max(max_payload_bytes))
        .with_state(state)
}

async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Store(MetadraftError::Storage(format!("store task failed: {}", e)).into()))?
        .map_err(ApiError::Store)
}

fn parse_payload(body: std::result::Result<Json<DraftRequest>, JsonRejection>) -> ApiResult<Document> {
    let Json(request) = body?;
    Ok(Document::from_value(request.payload)?)
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_draft(
    State(state): State<AppState>,
    SessionOwner(owner): SessionOwner,
    body: std::result::Result<Json<DraftRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let payload = parse_payload(body)?;
    let store = state.store.clone();
    let created = blocking(move || store.create(&owner, payload)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_draft(
    State(state): State<AppState>,
    SessionOwner(owner): SessionOwner,
    Path(id): Path<String>,
    body: std::result::Result<Json<DraftRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let payload = parse_payload(body)?;
    let store = state.store.clone();
    let updated = blocking(move || store.update(&id, &owner, payload)).await?;
    Ok(Json(updated))
}

async fn get_draft(
    State(state): State<AppState>,
    SessionOwner(owner): SessionOwner,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let store = state.store.clone();
    let view = blocking(move || store.get(&id, &owner)).await?;
    Ok(Json(view))
}

async fn delete_draft(
    State(state): State<AppState>,
    SessionOwner(owner): SessionOwner,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let store = state.store.clone();
    let deleted_id = id.clone();
    blocking(move || store.delete(&id, &owner)).await?;
    Ok(Json(json!({ "id": deleted_id, "deleted": true })))
}

async fn latest_draft(
    State(state): State<AppState>,
    SessionOwner(owner): SessionOwner,
) -> ApiResult<Response> {
    let store = state.store.clone();
    let latest = blocking(move || store.latest_for_session(&owner)).await?;
    Ok(match latest {
        Some(view) => Json(view).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Run the HTTP service until Ctrl-C.
///
/// Besides the request-triggered sweeps, a background task offers the store
/// a sweep every `sweep_interval_seconds` so idle deployments still purge
/// expired drafts.
pub async fn serve(config: &Config, store: Arc<DraftStore>) -> Result<()> {
    #[cfg(feature = "prometheus")]
    {
        if let Some(metrics_bind) = &config.server.metrics_bind {
            let addr: std::net::SocketAddr = metrics_bind
                .parse()
                .map_err(|e| MetadraftError::Config(format!("Invalid metrics_bind: {}", e)))?;
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .map_err(|e| {
                    MetadraftError::Config(format!("Failed to start metrics exporter: {}", e))
                })?;
            tracing::info!(%addr, "Prometheus exporter listening");
        }
    }

    let sweeper = {
        let store = store.clone();
        let period = Duration::from_secs(config.store.sweep_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let store = store.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || store.maybe_sweep()).await {
                    tracing::warn!(error = %e, "Background sweep task failed");
                }
            }
        })
    };

    let state = AppState {
        store,
        session_cookie: config.server.session_cookie.clone(),
    };
    let app = router(state, config.server.max_payload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| MetadraftError::Config(format!("Failed to bind {}: {}", config.server.bind, e)))?;
    tracing::info!(bind = %config.server.bind, "Draft service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
