use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use hickory_resolver::TokioAsyncResolver;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tower_http::{
    services::{ServeDir, ServeFile},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::{
    config::ServerConfig,
    dns::{self, DnsReport},
    error::{LinkError, LookupError, ScanError},
    geoip::{GeoClient, GeoInfo},
    hash::{self, HashOutput},
    links::{self, LinkStore, LinkSummary, MemoryLinkStore, NewVisit},
    normalize::{self, RawScanRequest},
    scanner::{self, Dialer, ScanConfig, TcpDialer},
    types::ScanReport,
    whois::{self, WhoisReport},
};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    scan: ScanConfig,
    dialer: Arc<dyn Dialer>,
    links: Arc<dyn LinkStore>,
    resolver: TokioAsyncResolver,
    geo: GeoClient,
    whois_server: String,
    /// Cancelled when the server shuts down; every scan runs under a child token.
    shutdown: CancellationToken,
}

/// JSON error body `{"error": "..."}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ScanError> for ApiError {
    fn from(e: ScanError) -> Self {
        match e {
            ScanError::InvalidInput(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            ScanError::Aborted => Self::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
            ScanError::DeadlineExceeded(_) => {
                warn!(error = %e, "port scan timed out");
                Self::new(StatusCode::GATEWAY_TIMEOUT, e.to_string())
            }
            ScanError::Internal(_) => {
                error!(error = %e, "port scan failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "port scan failed")
            }
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::InvalidInput(msg) | LookupError::Rejected(msg) => {
                Self::new(StatusCode::BAD_REQUEST, msg)
            }
            LookupError::Timeout(_) => Self::new(StatusCode::GATEWAY_TIMEOUT, e.to_string()),
            LookupError::Upstream(_) | LookupError::Io(_) | LookupError::Http(_) => {
                warn!(error = %e, "upstream lookup failed");
                Self::new(StatusCode::BAD_GATEWAY, e.to_string())
            }
        }
    }
}

impl From<LinkError> for ApiError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::InvalidUrl(msg) => Self::new(StatusCode::BAD_REQUEST, msg),
            LinkError::NotFound => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            LinkError::CodeTaken(_) => {
                error!(error = %e, "could not allocate a short code");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "could not create link")
            }
        }
    }
}

/// Build the application router: JSON API under `/api`, short-link redirects under `/r`,
/// static files everywhere else.
pub fn router(config: &ServerConfig, shutdown: CancellationToken) -> Result<Router> {
    router_with(
        config,
        shutdown,
        Arc::new(TcpDialer),
        Arc::new(MemoryLinkStore::new()),
    )
}

/// Like [`router`] with an explicit dialer and link store.
pub fn router_with(
    config: &ServerConfig,
    shutdown: CancellationToken,
    dialer: Arc<dyn Dialer>,
    links: Arc<dyn LinkStore>,
) -> Result<Router> {
    let state = AppState {
        inner: Arc::new(Shared {
            scan: config.scan,
            dialer,
            links,
            resolver: dns::system_resolver(),
            geo: GeoClient::new(config.geoip_endpoint.clone())
                .context("failed to build geolocation client")?,
            whois_server: config.whois_server.clone(),
            shutdown,
        }),
    };

    let api = Router::new()
        .route("/port-scan", post(post_port_scan))
        .route("/dns/{domain}", get(get_dns))
        .route("/ip-lookup/{ip}", get(get_ip_lookup))
        .route("/whois/{domain}", get(get_whois))
        .route("/my-ip", get(get_my_ip))
        .route("/hash", post(post_hash))
        .route("/hash-all", post(post_hash_all))
        .route("/links", post(post_link).get(get_links))
        .route("/links/{code}", delete(delete_link))
        .route("/links/{code}/visits", get(get_link_visits))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state.clone());

    let redirects = Router::new()
        .route("/r/{code}", get(get_redirect))
        .with_state(state);

    let static_svc = ServeDir::new(&config.static_dir)
        .append_index_html_on_directories(true)
        .fallback(ServeFile::new(config.static_dir.join("index.html")));

    Ok(Router::new()
        .nest("/api", api)
        .merge(redirects)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http()))
}

/// Bind and serve until `shutdown` is cancelled. In-flight scans are aborted on shutdown.
pub async fn serve(config: ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let app = router(&config, shutdown.clone())?;
    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    info!(addr = %listener.local_addr()?, "serving API and UI");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    info!("server stopped");
    Ok(())
}

async fn post_port_scan(
    State(app): State<AppState>,
    payload: Result<Json<RawScanRequest>, JsonRejection>,
) -> Result<Json<ScanReport>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    let plan = normalize::normalize_request(&req)?;

    let config = app.inner.scan;
    let deadline = config.deadline_for(plan.port_count());
    let cancel = app.inner.shutdown.child_token();
    let dialer = Arc::clone(&app.inner.dialer);
    let report = time::timeout(
        deadline,
        scanner::scan_with_dialer(&plan, &config, cancel, dialer),
    )
    .await
    .map_err(|_| ScanError::DeadlineExceeded(deadline))??;
    Ok(Json(report))
}

async fn get_dns(
    State(app): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<DnsReport>, ApiError> {
    Ok(Json(dns::lookup_all(&app.inner.resolver, &domain).await?))
}

async fn get_ip_lookup(
    State(app): State<AppState>,
    Path(ip): Path<String>,
) -> Result<Json<GeoInfo>, ApiError> {
    Ok(Json(app.inner.geo.lookup(&ip).await?))
}

async fn get_whois(
    State(app): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<WhoisReport>, ApiError> {
    Ok(Json(whois::lookup(&app.inner.whois_server, &domain).await?))
}

async fn get_my_ip(req: Request) -> impl IntoResponse {
    Json(json!({ "ip": client_ip(req.headers(), peer_addr(&req)) }))
}

#[derive(Debug, Deserialize)]
struct HashRequest {
    #[serde(default)]
    text: String,
    #[serde(default)]
    algorithm: Option<String>,
}

async fn post_hash(
    payload: Result<Json<HashRequest>, JsonRejection>,
) -> Result<Json<HashOutput>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    Ok(Json(hash::hash_text(&req.text, req.algorithm.as_deref())?))
}

async fn post_hash_all(
    payload: Result<Json<HashRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    let hashes = hash::hash_all(&req.text)?;
    Ok(Json(json!({ "hashes": hashes })))
}

#[derive(Debug, Deserialize)]
struct NewLinkRequest {
    #[serde(default)]
    url: String,
}

async fn post_link(
    State(app): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<NewLinkRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    let link = links::create_link(app.inner.links.as_ref(), &req.url).await?;
    Ok(Json(json!({
        "success": true,
        "code": link.code,
        "trackingUrl": tracking_url(&headers, &link.code),
        "originalUrl": link.original_url,
    })))
}

async fn get_links(State(app): State<AppState>) -> Json<Vec<LinkSummary>> {
    Json(app.inner.links.list_links().await)
}

async fn get_link_visits(
    State(app): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let link = app
        .inner
        .links
        .get_link(&code)
        .await
        .ok_or(LinkError::NotFound)?;
    let visits = app.inner.links.visits(&code).await;
    Ok(Json(json!({ "link": link, "visits": visits })))
}

async fn delete_link(
    State(app): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<Value>, ApiError> {
    app.inner.links.delete_link(&code).await?;
    info!(%code, "short link deleted");
    Ok(Json(json!({ "success": true })))
}

/// Record the visit and answer with a 302 to the stored URL.
async fn get_redirect(
    State(app): State<AppState>,
    Path(code): Path<String>,
    req: Request,
) -> Response {
    let Some(link) = app.inner.links.get_link(&code).await else {
        return (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response();
    };

    let headers = req.headers();
    let visit = NewVisit {
        ip_address: client_ip(headers, peer_addr(&req)),
        user_agent: header_str(headers, header::USER_AGENT).unwrap_or_else(|| "unknown".into()),
        referer: header_str(headers, header::REFERER),
    };
    if let Err(e) = app.inner.links.insert_visit(&code, visit).await {
        // deleted between lookup and insert
        warn!(%code, error = %e, "visit not recorded");
    }

    match HeaderValue::from_str(&link.original_url) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(_) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "stored URL is not a valid header")
            .into_response(),
    }
}

const NOT_FOUND_PAGE: &str = "<!DOCTYPE html><html><head><meta charset=\"UTF-8\"><title>404</title></head>\
<body><h1>404</h1><p>This link does not exist or was deleted.</p></body></html>";

fn peer_addr(req: &Request) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `<proto>://<host>/r/<code>` using `X-Forwarded-Proto` and `Host` when present.
fn tracking_url(headers: &HeaderMap, code: &str) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}/r/{code}")
}

/// First `X-Forwarded-For` entry, else the peer address, else `unknown`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
