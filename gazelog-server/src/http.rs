//! Gazelog HTTP REST API
//!
//! Axum-based HTTP server that exposes session ingestion and retrieval.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions are directly testable without axum dispatch
//! machinery.
//!
//! Endpoints:
//! - GET  /health            — health check with storage status
//! - GET  /version           — server version info
//! - POST /api/sessions      — ingest one finished session
//! - GET  /api/sessions      — paginated summaries, newest first
//! - GET  /api/sessions/{id} — one session with samples, oldest first

use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use gazelog_core::config::HttpConfig;
use gazelog_core::{GazelogConfig, ServiceError, SessionStore};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

use crate::subsystems::ingest::{CreateSessionRequest, IngestService};
use crate::subsystems::retrieve::RetrieveService;

/// Header carrying the client's device descriptor. `User-Agent` is the fallback.
pub const DEVICE_LABEL_HEADER: &str = "x-device-label";

/// Shared state for all HTTP handlers
#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<dyn SessionStore>,
    pub ingest: IngestService,
    pub retrieve: RetrieveService,
    /// Body limit for uploads; axum's 2 MB default is too small for long sessions.
    pub max_body_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl HttpState {
    pub fn new(store: Arc<dyn SessionStore>, config: &GazelogConfig) -> Self {
        Self {
            ingest: IngestService::new(Arc::clone(&store), config.ingest.clone()),
            retrieve: RetrieveService::new(Arc::clone(&store), config.retrieval.clone()),
            max_body_bytes: config.ingest.max_body_bytes,
            cors_origins: config.http.cors_origins.clone(),
            store,
        }
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let api = Router::new()
        .route(
            "/sessions",
            get(list_sessions_handler).post(create_session_handler),
        )
        .route("/sessions/:id", get(get_session_handler))
        .layer(DefaultBodyLimit::max(state.max_body_bytes));

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .nest("/api", api);

    match cors_layer(&state.cors_origins) {
        Some(cors) => router.layer(cors).with_state(state),
        None => router.with_state(state),
    }
}

/// CORS for the configured browser origins. `None` when no origin is usable.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if allowed.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<HttpState>,
    config: &HttpConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Gazelog HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }
}

fn error_body(status: StatusCode, msg: impl Into<String>) -> (StatusCode, serde_json::Value) {
    let body = serde_json::to_value(ErrorResponse::new(msg))
        .unwrap_or_else(|_| serde_json::json!({"status": "error"}));
    (status, body)
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Map a service error to a status code and a body that carries no storage detail.
pub fn error_response(err: &ServiceError) -> (StatusCode, serde_json::Value) {
    match err {
        ServiceError::InvalidInput(msg) => error_body(StatusCode::BAD_REQUEST, msg.clone()),
        ServiceError::NotFound(id) => {
            error_body(StatusCode::NOT_FOUND, format!("no such session: {}", id))
        }
        ServiceError::StorageUnavailable => {
            error_body(StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        }
        ServiceError::IngestionFailed => {
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "failed to persist session")
        }
        ServiceError::Storage(_) => {
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal storage error")
        }
    }
}

/// Device descriptor from `X-Device-Label`, else `User-Agent`.
/// A label that is not visible ASCII counts as absent.
pub fn device_label_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(DEVICE_LABEL_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
        })
}

/// Inner health check — queries storage and returns (status_code, json_body).
pub async fn health_inner(store: &dyn SessionStore) -> (StatusCode, serde_json::Value) {
    match store.health().await {
        Ok(storage) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "storage": storage,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({
                    "status": "unhealthy",
                    "error": "storage unavailable",
                }),
            )
        }
    }
}

/// Inner version — returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "gazelog",
    })
}

/// Inner create — ingests one session.
pub async fn create_session_inner(
    ingest: &IngestService,
    req: CreateSessionRequest,
    device_label: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    match ingest.create_session(req, device_label).await {
        Ok(id) => (
            StatusCode::CREATED,
            serde_json::json!({
                "id": id,
                "status": "created",
            }),
        ),
        Err(e) => error_response(&e),
    }
}

/// Inner list — one page of summaries.
pub async fn list_sessions_inner(
    retrieve: &RetrieveService,
    params: ListParams,
) -> (StatusCode, serde_json::Value) {
    match retrieve
        .list_sessions(params.offset.unwrap_or(0), params.limit)
        .await
    {
        Ok(page) => match serde_json::to_value(&page) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize session page");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
            }
        },
        Err(e) => error_response(&e),
    }
}

/// Inner get — `raw_id` comes straight from the path and is parsed here.
pub async fn get_session_inner(
    retrieve: &RetrieveService,
    raw_id: &str,
) -> (StatusCode, serde_json::Value) {
    let id = match Uuid::parse_str(raw_id) {
        Ok(id) => id,
        Err(_) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                format!("invalid session id: {}", raw_id),
            );
        }
    };

    match retrieve.get_session(id).await {
        Ok(detail) => match serde_json::to_value(&detail) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize session");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "serialization failed")
            }
        },
        Err(e) => error_response(&e),
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(state.store.as_ref()).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn create_session_handler(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CreateSessionRequest>, JsonRejection>,
) -> impl IntoResponse {
    let (status, body) = match payload {
        Ok(Json(req)) => {
            create_session_inner(&state.ingest, req, device_label_from_headers(&headers)).await
        }
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            error_body(StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
        }
        Err(rejection) => error_response(&ServiceError::InvalidInput(rejection.body_text())),
    };
    (status, Json(body))
}

pub async fn list_sessions_handler(
    State(state): State<Arc<HttpState>>,
    params: std::result::Result<Query<ListParams>, QueryRejection>,
) -> impl IntoResponse {
    let (status, body) = match params {
        Ok(Query(params)) => list_sessions_inner(&state.retrieve, params).await,
        Err(rejection) => error_response(&ServiceError::InvalidInput(rejection.body_text())),
    };
    (status, Json(body))
}

pub async fn get_session_handler(
    State(state): State<Arc<HttpState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = get_session_inner(&state.retrieve, &id).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use gazelog_core::MemorySessionStore;

    fn make_state() -> HttpState {
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        HttpState::new(store, &GazelogConfig::default())
    }

    // ========================================================================
    // TEST 1: version_inner is pure and returns correct fields
    // ========================================================================
    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["service"], "gazelog");
    }

    // ========================================================================
    // TEST 2: error_response maps each kind to a distinct status
    // ========================================================================
    #[test]
    fn test_error_response_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(
            error_response(&ServiceError::InvalidInput("x".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(error_response(&ServiceError::NotFound(id)).0, StatusCode::NOT_FOUND);
        assert_eq!(
            error_response(&ServiceError::StorageUnavailable).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            error_response(&ServiceError::IngestionFailed).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    // ========================================================================
    // TEST 3: storage error text never reaches the body
    // ========================================================================
    #[test]
    fn test_error_response_hides_storage_detail() {
        let err = ServiceError::Storage(gazelog_core::StoreError::ConstraintViolation(
            "duplicate key value violates unique constraint \"sample_pkey\"".into(),
        ));
        let (status, body) = error_response(&err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(!body["error"].as_str().unwrap().contains("sample_pkey"));
    }

    // ========================================================================
    // TEST 4: device label prefers the explicit header over User-Agent
    // ========================================================================
    #[test]
    fn test_device_label_header_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(device_label_from_headers(&headers), None);

        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        assert_eq!(device_label_from_headers(&headers), Some("Mozilla/5.0"));

        headers.insert(DEVICE_LABEL_HEADER, HeaderValue::from_static("tobii-4c"));
        assert_eq!(device_label_from_headers(&headers), Some("tobii-4c"));

        // Non-ASCII label bytes fall through to User-Agent
        headers.insert(
            DEVICE_LABEL_HEADER,
            HeaderValue::from_bytes("café".as_bytes()).unwrap(),
        );
        assert_eq!(device_label_from_headers(&headers), Some("Mozilla/5.0"));
    }

    // ========================================================================
    // TEST 5: health_inner reports healthy for the in-memory store
    // ========================================================================
    #[tokio::test]
    async fn test_health_inner_ok() {
        let state = make_state();
        let (status, body) = health_inner(state.store.as_ref()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    // ========================================================================
    // TEST 6: create then get round-trips through the inner functions
    // ========================================================================
    #[tokio::test]
    async fn test_create_then_get_inner() {
        let state = make_state();
        let req: CreateSessionRequest = serde_json::from_value(serde_json::json!({
            "sample_rate": 60,
            "duration": 0.5,
            "samples": [
                {"timestamp": "2025-08-16T19:15:43.032Z", "pos": 0.3},
                {"timestamp": "2025-08-16T19:15:43.016Z", "pos": 0.2}
            ]
        }))
        .unwrap();

        let (status, body) = create_session_inner(&state.ingest, req, None).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = body["id"].as_str().unwrap().to_string();

        let (status, body) = get_session_inner(&state.retrieve, &id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["device_label"], "Unknown");
        assert_eq!(body["samples"].as_array().unwrap().len(), 2);
        assert_eq!(body["samples"][0]["pos"], 0.2);
    }

    // ========================================================================
    // TEST 7: get_session_inner — malformed id is 400, unknown id is 404
    // ========================================================================
    #[tokio::test]
    async fn test_get_session_inner_bad_and_unknown_ids() {
        let state = make_state();

        let (status, _) = get_session_inner(&state.retrieve, "not-a-uuid").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            get_session_inner(&state.retrieve, &Uuid::new_v4().to_string()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }

    // ========================================================================
    // TEST 8: list_sessions_inner — defaults applied on empty params
    // ========================================================================
    #[tokio::test]
    async fn test_list_sessions_inner_defaults() {
        let state = make_state();
        let (status, body) = list_sessions_inner(&state.retrieve, ListParams::default()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["offset"], 0);
        assert_eq!(body["limit"], 50);
        assert_eq!(body["count"], 0);
    }

    // ========================================================================
    // TEST 9: cors_layer skips unparsable origins and disables on empty
    // ========================================================================
    #[test]
    fn test_cors_layer_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_none());
        assert!(cors_layer(&["http://localhost:5173".to_string()]).is_some());
    }
}
