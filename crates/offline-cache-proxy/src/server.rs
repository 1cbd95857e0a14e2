//! HTTP server for the offline cache proxy
//!
//! Provides /health and /_offline/control; every other path is intercepted
//! and served through the cache.

use crate::origin::{is_credentialed, to_http_response, OriginClient};
use crate::types::{ControlAccepted, ErrorResponse, HealthResponse};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use offline_cache::{ControlHandle, ControlMessage, OfflineCache, RequestIdentity, Served};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: Arc<OfflineCache>,
    pub origin: OriginClient,
    pub control: ControlHandle,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: Arc<OfflineCache>, origin: OriginClient, control: ControlHandle) -> Self {
        Self {
            cache,
            origin,
            control,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/_offline/control", post(control))
        .fallback(intercept)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        version: state.cache.version().to_string(),
        phase: state.cache.phase(),
        cache: state.cache.stats(),
    })
}

/// Queue a control message for the background loop
async fn control(
    State(state): State<SharedState>,
    Json(message): Json<ControlMessage>,
) -> Response {
    if state.control.send(message) {
        (
            StatusCode::ACCEPTED,
            Json(ControlAccepted { queued: true }),
        )
            .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Control queue unavailable".to_string(),
            }),
        )
            .into_response()
    }
}

/// Page loads announce themselves through Sec-Fetch-Mode or by asking for HTML
fn is_navigation(headers: &HeaderMap) -> bool {
    let fetch_mode = headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok());
    if fetch_mode == Some("navigate") {
        return true;
    }

    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

/// Serve any other path through the cache. Non-GET and credentialed
/// requests go straight to the origin.
async fn intercept(State(state): State<SharedState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let url = match state.origin.url_for(path_and_query) {
        Ok(url) => url,
        Err(e) => {
            warn!(path = %path_and_query, error = %e, "Unroutable request");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Invalid request path".to_string(),
                }),
            )
                .into_response();
        }
    };

    if parts.method != Method::GET || is_credentialed(&parts.headers) {
        let identity = RequestIdentity::new(parts.method.as_str(), url.clone());
        return match state
            .origin
            .passthrough(parts.method, url, &parts.headers, body)
            .await
        {
            Ok(mut response) => {
                response
                    .headers_mut()
                    .insert("x-cache", HeaderValue::from_static("BYPASS"));
                response
            }
            Err(e) => {
                debug!(url = %identity.url, error = %e, "Passthrough failed");
                let served = Served::unavailable(&identity);
                to_http_response(&served.response, served.source.cache_status())
            }
        };
    }

    let identity = if is_navigation(&parts.headers) {
        RequestIdentity::navigate(url)
    } else {
        RequestIdentity::get(url)
    };

    let fetcher = state.origin.forwarding(&parts.headers);
    let served = state.cache.handle(&identity, &fetcher).await;
    to_http_response(&served.response, served.source.cache_status())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use offline_cache::{
        CacheConfig, CachedResponse, EntryStore, FileStore, MemoryStore, StoredEntry,
    };
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use url::Url;

    const OFFLINE_ORIGIN: &str = "http://127.0.0.1:9";

    fn create_test_state(
        store: Arc<dyn EntryStore>,
        origin: &str,
    ) -> (SharedState, mpsc::Receiver<ControlMessage>) {
        let config = CacheConfig {
            version: "test-v1".to_string(),
            ..CacheConfig::default()
        };
        let cache = Arc::new(OfflineCache::new(store, config).unwrap());
        let origin = OriginClient::new(Url::parse(origin).unwrap());
        let (control, rx) = ControlHandle::channel();
        (Arc::new(ServerState::new(cache, origin, control)), rx)
    }

    async fn seed(store: &MemoryStore, url: &str, body: &str) {
        let key = RequestIdentity::parse("GET", url).unwrap().cache_key();
        let entry = StoredEntry::exempt(
            CachedResponse::new(200, body).with_header("content-type", "text/plain"),
        );
        store.put("test-v1", &key, &entry).await.unwrap();
    }

    async fn body_string(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    /// Minimal origin on an ephemeral port
    async fn spawn_origin() -> String {
        let app = Router::new()
            .route("/app.css", get(|| async { "body { color: teal; }" }))
            .route("/api/echo", post(|body: String| async move { body }))
            .route(
                "/api/me",
                get(|headers: HeaderMap| async move {
                    match headers.get(header::AUTHORIZATION) {
                        Some(token) => {
                            let token = token.to_str().unwrap_or_default().to_string();
                            token.into_response()
                        }
                        None => StatusCode::UNAUTHORIZED.into_response(),
                    }
                }),
            )
            .route(
                "/greeting",
                get(|headers: HeaderMap| async move {
                    let language = headers
                        .get(header::ACCEPT_LANGUAGE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("none");
                    format!("lang={}", language)
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_is_navigation() {
        let mut headers = HeaderMap::new();
        assert!(!is_navigation(&headers));

        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!is_navigation(&headers));

        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        assert!(is_navigation(&headers));

        let mut headers = HeaderMap::new();
        headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
        assert!(is_navigation(&headers));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _rx) = create_test_state(Arc::new(MemoryStore::new()), OFFLINE_ORIGIN);
        let router = create_router(state);

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], "test-v1");
        assert_eq!(json["phase"], "Installing");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["cache"]["hits"], 0);
    }

    #[tokio::test]
    async fn test_control_endpoint_queues_message() {
        let (state, mut rx) = create_test_state(Arc::new(MemoryStore::new()), OFFLINE_ORIGIN);
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/_offline/control")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"ForceActivate"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(rx.try_recv().unwrap(), ControlMessage::ForceActivate);
    }

    #[tokio::test]
    async fn test_control_endpoint_rejects_unknown_message() {
        let (state, mut rx) = create_test_state(Arc::new(MemoryStore::new()), OFFLINE_ORIGIN);
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/_offline/control")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"Reboot"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_control_endpoint_when_loop_stopped() {
        let (state, rx) = create_test_state(Arc::new(MemoryStore::new()), OFFLINE_ORIGIN);
        drop(rx);
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/_offline/control")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"ClearCache"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_offline_with_nothing_cached() {
        let (state, _rx) = create_test_state(Arc::new(MemoryStore::new()), OFFLINE_ORIGIN);
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/rates")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["x-cache"], "OFFLINE");
        assert_eq!(response.headers()["x-offline-cache"], "unavailable");

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["kind"], "NoCachedData");
        assert_eq!(json["url"], "http://127.0.0.1:9/api/rates");
    }

    #[tokio::test]
    async fn test_seeded_entry_served_offline() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "http://127.0.0.1:9/app.css", "cached css").await;
        let (state, _rx) = create_test_state(store, OFFLINE_ORIGIN);
        let router = create_router(state.clone());

        let response = router
            .oneshot(Request::builder().uri("/app.css").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(body_string(response).await, "cached css");
        assert_eq!(state.cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_navigation_falls_back_to_root_document() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, "http://127.0.0.1:9/", "<html>app shell</html>").await;
        let (state, _rx) = create_test_state(store, OFFLINE_ORIGIN);
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/settings?tab=display")
                    .header("accept", "text/html")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "FALLBACK");
        assert_eq!(body_string(response).await, "<html>app shell</html>");
    }

    #[tokio::test]
    async fn test_non_get_offline_is_unavailable() {
        let (state, _rx) = create_test_state(Arc::new(MemoryStore::new()), OFFLINE_ORIGIN);
        let router = create_router(state);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/posts")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["x-cache"], "OFFLINE");
    }

    #[tokio::test]
    async fn test_live_origin_miss_then_hit() {
        let origin = spawn_origin().await;
        let (state, _rx) = create_test_state(Arc::new(MemoryStore::new()), &origin);

        let first = create_router(state.clone())
            .oneshot(Request::builder().uri("/app.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["x-cache"], "MISS");
        assert_eq!(body_string(first).await, "body { color: teal; }");

        let second = create_router(state.clone())
            .oneshot(Request::builder().uri("/app.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.headers()["x-cache"], "HIT");
        assert_eq!(body_string(second).await, "body { color: teal; }");

        let stats = state.cache.stats();
        assert_eq!(stats.network, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_live_origin_passthrough_streams_body() {
        let origin = spawn_origin().await;
        let (state, _rx) = create_test_state(Arc::new(MemoryStore::new()), &origin);

        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/echo")
                    .body(Body::from("ping"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "BYPASS");
        assert_eq!(body_string(response).await, "ping");
    }

    #[tokio::test]
    async fn test_file_store_survives_restart() {
        let dir = tempdir().unwrap();
        let origin = spawn_origin().await;

        {
            let store = Arc::new(FileStore::new(dir.path().to_path_buf()));
            store.init().await.unwrap();
            let (state, _rx) = create_test_state(store, &origin);
            let response = create_router(state)
                .oneshot(Request::builder().uri("/app.css").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.headers()["x-cache"], "MISS");
        }

        // Same origin address, fresh process state: the entry comes from disk
        let store = Arc::new(FileStore::new(dir.path().to_path_buf()));
        store.init().await.unwrap();
        let (state, _rx) = create_test_state(store, &origin);
        let response = create_router(state)
            .oneshot(Request::builder().uri("/app.css").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(body_string(response).await, "body { color: teal; }");
    }

    #[tokio::test]
    async fn test_credentialed_get_reaches_origin_and_is_not_stored() {
        let origin = spawn_origin().await;
        let store = Arc::new(MemoryStore::new());
        let (state, _rx) = create_test_state(store.clone(), &origin);

        let response = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/me")
                    .header("authorization", "Bearer alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "BYPASS");
        assert_eq!(body_string(response).await, "Bearer alice");
        assert_eq!(store.entry_count("test-v1").await, 0);

        // Another client without credentials never sees the first one's answer
        let response = create_router(state)
            .oneshot(Request::builder().uri("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cached_get_forwards_client_headers() {
        let origin = spawn_origin().await;
        let (state, _rx) = create_test_state(Arc::new(MemoryStore::new()), &origin);

        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/greeting")
                    .header("accept-language", "fr-CH")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "MISS");
        assert_eq!(body_string(response).await, "lang=fr-CH");
    }
}
