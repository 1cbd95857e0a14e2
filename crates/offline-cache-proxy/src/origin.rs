//! HTTP client for the origin server

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Method, Response, StatusCode};
use offline_cache::{CacheError, CachedResponse, Fetcher, RequestIdentity};
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Headers that describe a single connection and must not be relayed
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Fetches resources from the configured origin
#[derive(Clone)]
pub struct OriginClient {
    client: Client,
    origin: Url,
}

impl OriginClient {
    pub fn new(origin: Url) -> Self {
        Self {
            client: Client::new(),
            origin,
        }
    }

    /// Absolute origin URL for an incoming path and query
    pub fn url_for(&self, path_and_query: &str) -> Result<Url, url::ParseError> {
        let base = self.origin.as_str().trim_end_matches('/');
        let path = path_and_query.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path))
    }

    /// Forward a request untouched, streaming both bodies. GET and HEAD are
    /// sent without a body.
    pub async fn passthrough(
        &self,
        method: Method,
        url: Url,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<Response<Body>, CacheError> {
        debug!(%method, url = %url, "Passing request through to origin");

        let has_body = method != Method::GET && method != Method::HEAD;
        let mut request = self.client.request(method, url);
        if has_body {
            request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        for (name, value) in headers {
            if !is_hop_by_hop(name.as_str()) && name.as_str() != "content-length" {
                request = request.header(name, value);
            }
        }

        let resp = request
            .send()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        let mut builder = Response::builder().status(resp.status());
        for (name, value) in resp.headers() {
            if !is_hop_by_hop(name.as_str()) && name.as_str() != "content-length" {
                builder = builder.header(name, value);
            }
        }

        builder
            .body(Body::from_stream(resp.bytes_stream()))
            .map_err(|e| CacheError::Transport(e.to_string()))
    }

    pub fn forwarding<'a>(&'a self, headers: &'a HeaderMap) -> ForwardedRequest<'a> {
        ForwardedRequest {
            origin: self,
            headers,
        }
    }

    /// Fetch the complete response. Accept-Encoding is never relayed; stored
    /// bodies are identity-encoded.
    async fn fetch_with(
        &self,
        request: &RequestIdentity,
        client_headers: Option<&HeaderMap>,
    ) -> Result<CachedResponse, CacheError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        let mut builder = self.client.request(method, request.url.clone());
        let mut has_accept = false;
        for (name, value) in client_headers.into_iter().flatten() {
            if is_hop_by_hop(name.as_str())
                || name == header::CONTENT_LENGTH
                || name == header::ACCEPT_ENCODING
            {
                continue;
            }
            has_accept |= name == header::ACCEPT;
            builder = builder.header(name, value);
        }
        if request.navigation && !has_accept {
            builder = builder.header(header::ACCEPT, "text/html");
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let headers: Vec<(String, String)> = resp
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()) && name.as_str() != "content-length")
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = resp
            .bytes()
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;

        debug!(url = %request.url, status, size = body.len(), "Fetched from origin");

        Ok(CachedResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Requests carrying credentials are answered per user and never cached
pub fn is_credentialed(headers: &HeaderMap) -> bool {
    headers.contains_key(header::AUTHORIZATION) || headers.contains_key(header::COOKIE)
}

#[async_trait]
impl Fetcher for OriginClient {
    async fn fetch(&self, request: &RequestIdentity) -> Result<CachedResponse, CacheError> {
        self.fetch_with(request, None).await
    }
}

/// Live fetch for one client request, replaying its end-to-end headers
pub struct ForwardedRequest<'a> {
    origin: &'a OriginClient,
    headers: &'a HeaderMap,
}

#[async_trait]
impl<'a> Fetcher for ForwardedRequest<'a> {
    async fn fetch(&self, request: &RequestIdentity) -> Result<CachedResponse, CacheError> {
        self.origin.fetch_with(request, Some(self.headers)).await
    }
}

/// Render a cached or live response as an HTTP response
pub fn to_http_response(response: &CachedResponse, cache_status: &str) -> Response<Body> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);

    for (name, value) in &response.headers {
        if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            builder = builder.header(name, value.as_str());
        }
    }

    builder
        .header("X-Cache", cache_status)
        .body(Body::from(response.body.clone()))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(Body::from("Invalid cached response"));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
