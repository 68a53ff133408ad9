//! HTTP accept loop: binds the listening socket and spawns one task per connection, handing
//! each to [`handle_request`]. Modeled on a plain `TcpListener::bind` + `loop { listener.accept() }`
//! pattern rather than a higher-level framework, since nothing else in this stack pulls in a
//! web framework.

use crate::config::Config;
use crate::delete::DeleteEngine;
use crate::download::DownloadEngine;
use crate::error::ProxyError;
use crate::health::{echo, health_summary, HealthSampler};
use crate::httpclient::{self, BackendClient};
use crate::identity::{client_addr, denied_detail, trace_id, uni_source, Whitelist};
use crate::metrics::{REQUESTS_TOTAL, REQUEST_DURATION};
use crate::model::ApiResult;
use crate::query::QueryEngine;
use crate::router::{route, unknown_uri_matcher, Route};
use crate::upload::{parse_multipart, UploadEngine};
use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use regex::Regex;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use weeder_core::DirectoryAdapter;

/// Everything a request handler needs, shared across connections behind `Arc`.
pub struct AppState {
    pub config: Config,
    pub whitelist: Whitelist,
    pub unknown_uri: Regex,
    pub upload: UploadEngine,
    pub download: DownloadEngine,
    pub delete: DeleteEngine,
    pub query: QueryEngine,
    pub health: Arc<HealthSampler>,
}

impl AppState {
    pub fn new(config: Config, directory: Arc<dyn DirectoryAdapter>) -> Self {
        let client: BackendClient = httpclient::build_client(config.max_idle_conns_per_host);
        let whitelist = Whitelist::new(
            config.write_whitelist(),
            config.read_whitelist(),
            config.uni_source_check,
        );
        let unknown_uri = unknown_uri_matcher(&config.unknown_uri_checker);
        let upload = UploadEngine::new(client.clone(), directory.clone(), &config);
        let download = DownloadEngine::new(client.clone(), directory.clone(), &config);
        let delete = DeleteEngine::new(client.clone(), directory.clone(), &config);
        let query = QueryEngine::new(directory);
        let health = Arc::new(HealthSampler::new(client, &config));
        let check_interval = Duration::from_secs(config.volume_check_duration.max(1));

        let state = AppState {
            config,
            whitelist,
            unknown_uri,
            upload,
            download,
            delete,
            query,
            health,
        };
        state.spawn_health_sampler(check_interval);
        state
    }

    fn spawn_health_sampler(&self, interval: Duration) {
        let sampler = self.health.clone();
        tokio::spawn(async move { sampler.run(interval).await });
    }
}

/// Binds `addr` and serves connections until the process is terminated.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "weeder listening");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(handle_request(state, req, peer_addr).await) }
            });
            if let Err(err) = ConnBuilder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                tracing::debug!(error = %err, "connection closed with error");
            }
        });
    }
}

async fn handle_request(
    state: Arc<AppState>,
    req: Request<Incoming>,
    peer_addr: SocketAddr,
) -> Response<Full<Bytes>> {
    let trace = trace_id(req.headers());
    let user = uni_source(req.headers());
    let caddr = client_addr(req.headers(), peer_addr.ip());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    let started = std::time::Instant::now();
    let result = dispatch(&state, req, &path, &query, caddr).await;
    let status = result.http_status();

    REQUESTS_TOTAL.with_label_values(&[&path, &status.to_string()]).inc();
    REQUEST_DURATION.observe(started.elapsed().as_secs_f64());

    tracing::info!(
        trace = %trace,
        caddr = %caddr,
        saddr = %state.config.listen_addr(),
        key = %path,
        status = status,
        user = %user,
        class = "proxy",
        method = %method,
        "request handled"
    );

    json_response(status, &result)
}

async fn dispatch(
    state: &AppState,
    req: Request<Incoming>,
    path: &str,
    query: &str,
    caddr: IpAddr,
) -> ApiResult {
    match route(req.method(), path, &state.unknown_uri) {
        Route::Health => {
            let summary = health_summary(&state.health).await;
            ApiResult::ok(Vec::new()).with_raw(summary)
        }
        Route::Echo => ApiResult::ok(Vec::new()).with_message(echo()),
        Route::Denied => {
            tracing::info!(path, "denied");
            ApiResult::denied_silently()
        }
        Route::Submit => handle_upload(state, req, "/submit", query, caddr, false).await,
        Route::FilerUpload { path } => handle_upload(state, req, &path, query, caddr, true).await,
        Route::DeleteByForm => handle_delete_by_form(state, req, caddr).await,
        Route::Root => {
            if !state.whitelist.is_accessible(caddr) {
                tracing::info!(path, "denied");
                ApiResult::denied_silently()
            } else {
                handle_filer_read(state, "/", caddr).await
            }
        }
        Route::Public { path } => handle_public_read(state, &path).await,
        Route::FilerPath { path } => {
            if req.method() == hyper::Method::DELETE {
                handle_delete(state, &path, caddr).await
            } else {
                handle_filer_read(state, &path, caddr).await
            }
        }
        Route::Fid { fid } => {
            if req.method() == hyper::Method::DELETE {
                handle_delete(state, &fid, caddr).await
            } else {
                handle_fid_get(state, &fid, query).await
            }
        }
        Route::MethodNotAllowed => ApiResult::error(405, "method not allowed"),
    }
}

async fn handle_fid_get(state: &AppState, fid: &str, query: &str) -> ApiResult {
    let params = parse_query(query);
    if params.contains_key("filepath") {
        return state.query.by_filepath_query(fid).await;
    }
    if params.contains_key("fid") {
        return state.query.by_fid_query(fid).await;
    }
    match state.download.download_by_fid(fid).await {
        Ok(file) => ApiResult::ok(Vec::new()).with_blob(file.bytes, file.content_type),
        Err(e) => e.into_api_result(),
    }
}

async fn handle_filer_read(state: &AppState, path: &str, caddr: IpAddr) -> ApiResult {
    if !state.whitelist.is_accessible(caddr) {
        return ApiResult::error(406, denied_detail("read", caddr));
    }
    match state.download.download_by_path(path).await {
        Ok(file) => ApiResult::ok(Vec::new()).with_blob(file.bytes, file.content_type),
        Err(ProxyError::NotFound(_)) => ApiResult::not_found(path),
        Err(e) => e.into_api_result(),
    }
}

async fn handle_public_read(state: &AppState, path: &str) -> ApiResult {
    let full_path = format!("/public/{path}");
    match state.download.download_by_path(&full_path).await {
        Ok(file) => ApiResult::ok(Vec::new()).with_blob(file.bytes, file.content_type),
        Err(ProxyError::NotFound(_)) => ApiResult::not_found(&full_path),
        Err(e) => e.into_api_result(),
    }
}

async fn handle_delete(state: &AppState, fid_or_path: &str, caddr: IpAddr) -> ApiResult {
    if !state.whitelist.is_writable(caddr) {
        return ApiResult::error(406, denied_detail("write", caddr));
    }
    let result = if fid_or_path.starts_with('/') {
        state.delete.delete_by_path(fid_or_path).await
    } else {
        state.delete.delete_by_fid(fid_or_path).await
    };
    match result {
        Ok(()) => ApiResult::ok(Vec::new()),
        Err(e) => e.into_api_result(),
    }
}

async fn handle_delete_by_form(state: &AppState, req: Request<Incoming>, caddr: IpAddr) -> ApiResult {
    if !state.whitelist.is_writable(caddr) {
        return ApiResult::error(406, denied_detail("write", caddr));
    }
    if state.whitelist.requires_uni_source() && uni_source(req.headers()).is_empty() {
        return ApiResult::error(406, "Uni-Source header is required");
    }
    let body = match req.into_body().collect().await {
        Ok(c) => c.to_bytes(),
        Err(e) => return crate::error::ProxyError::BadRequest(e.to_string()).into_api_result(),
    };
    let form: std::collections::HashMap<String, String> =
        serde_urlencoded::from_bytes(&body).unwrap_or_default();
    let Some(path) = form.get("path") else {
        return ApiResult::error(400, "path form field is required");
    };
    handle_delete(state, path, caddr).await
}

async fn handle_upload(
    state: &AppState,
    req: Request<Incoming>,
    request_path: &str,
    query: &str,
    caddr: IpAddr,
    filer_mode: bool,
) -> ApiResult {
    if !state.whitelist.is_writable(caddr) {
        return ApiResult::error(406, denied_detail("write", caddr));
    }
    if state.whitelist.requires_uni_source() && uni_source(req.headers()).is_empty() {
        return ApiResult::error(406, "Uni-Source header is required");
    }

    let params = parse_query(query);
    let query_ttl = params.get("ttl").cloned();

    let content_type = req
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return crate::error::ProxyError::BadRequest(e.to_string()).into_api_result(),
    };

    let parsed = match parse_multipart(&content_type, body).await {
        Ok(parsed) => parsed,
        Err(e) => return e.into_api_result(),
    };

    state
        .upload
        .handle_upload(request_path, parsed, query_ttl.as_deref(), filer_mode)
        .await
}

fn parse_query(query: &str) -> std::collections::HashMap<String, String> {
    query
        .split('&')
        .filter(|kv| !kv.is_empty())
        .filter_map(|kv| {
            let mut it = kv.splitn(2, '=');
            let key = it.next()?;
            let value = it.next().unwrap_or("");
            Some((decode(key), decode(value)))
        })
        .collect()
}

fn decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .replace('+', " ")
}

fn cors(builder: http::response::Builder) -> http::response::Builder {
    builder
        .header(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(hyper::header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
        .header(hyper::header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, DELETE, OPTIONS")
        .header(hyper::header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Uni-Source, Request-Id")
        .header("Access-Control-Expose-Headers", "Request-Id")
}

fn json_response(status: u16, result: &ApiResult) -> Response<Full<Bytes>> {
    if result.closed {
        return cors(Response::builder())
            .status(StatusCode::from_u16(status).unwrap_or(StatusCode::NOT_ACCEPTABLE))
            .header(hyper::header::CONNECTION, "close")
            .body(Full::new(Bytes::new()))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
    }

    if let Some((bytes, content_type)) = result.raw_body() {
        return cors(Response::builder())
            .status(StatusCode::from_u16(status).unwrap_or(StatusCode::OK))
            .header(hyper::header::CONTENT_TYPE, content_type)
            .body(Full::new(bytes))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
    }

    let body = serde_json::to_vec(result).unwrap_or_default();
    cors(Response::builder())
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
