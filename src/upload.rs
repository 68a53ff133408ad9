//! Upload engine (C6): plain single-shot uploads, chunked-manifest uploads, and TTL-only path
//! registration.
//!
//! Multipart form fields recognized: `path` (repeatable) and `ttl`. File parts are uploaded;
//! the reserved field name `meta` marks the chunk-manifest metadata blob. A request with a
//! `meta` part and at least one other file part is a chunked-manifest upload; a request with
//! any other file part is a plain upload; a request with no file part at all is a
//! path-TTL-only registration.

use crate::config::Config;
use crate::error::{is_reset_by_peer, ProxyError};
use crate::httpclient::BackendClient;
use crate::identity::is_path_eligible_for_ttl;
use crate::model::{ApiResult, FileIdentity, FileMeta};
use crate::retry::with_failover;
use crate::urlcompose::{assign_url, compose_filer_target_url, public_file_url, submit_url, volume_upload_url};
use bytes::Bytes;
use futures_util::stream;
use http_body_util::{BodyExt, Full};
use hyper::{Request, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use weeder_core::{Backend, DirectoryAdapter, Role};

/// One file part of a multipart upload request, already buffered in memory.
pub struct UploadPart {
    pub field_name: String,
    pub file_name: String,
    pub bytes: Bytes,
}

/// A parsed multipart upload request, before classification.
#[derive(Default)]
pub struct ParsedUpload {
    pub paths: Vec<String>,
    pub ttl: Option<String>,
    pub files: Vec<UploadPart>,
    pub meta: Option<Bytes>,
}

/// Parses a multipart body, pulling the reserved `path`/`ttl` form fields and the reserved
/// `meta` file part out of the general file list.
pub async fn parse_multipart(content_type: &str, body: Bytes) -> Result<ParsedUpload, ProxyError> {
    let mut parsed = ParsedUpload::default();
    if content_type.is_empty() {
        return Ok(parsed);
    }
    let boundary =
        multer::parse_boundary(content_type).map_err(|e| ProxyError::BadRequest(e.to_string()))?;
    let body_stream = stream::once(async move { Ok::<_, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(body_stream, boundary);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProxyError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        match (name.as_str(), file_name) {
            ("path", None) => {
                let value = field.text().await.map_err(|e| ProxyError::BadRequest(e.to_string()))?;
                parsed.paths.push(value);
            }
            ("ttl", None) => {
                let value = field.text().await.map_err(|e| ProxyError::BadRequest(e.to_string()))?;
                parsed.ttl = Some(value);
            }
            ("meta", _) => {
                let bytes = field.bytes().await.map_err(|e| ProxyError::BadRequest(e.to_string()))?;
                parsed.meta = Some(bytes);
            }
            (_, Some(file_name)) => {
                let bytes = field.bytes().await.map_err(|e| ProxyError::BadRequest(e.to_string()))?;
                parsed.files.push(UploadPart {
                    field_name: name,
                    file_name,
                    bytes,
                });
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }
    Ok(parsed)
}

#[derive(Serialize)]
struct RegisterForm<'a> {
    #[serde(rename = "fileId")]
    file_id: &'a str,
    path: &'a str,
}

pub struct UploadEngine {
    client: BackendClient,
    directory: Arc<dyn DirectoryAdapter>,
    primary: Vec<Backend>,
    shadow: Vec<Backend>,
    retry: usize,
    file_url_prefix: String,
    dev_env_enforced_ttl: Option<String>,
    redis_cache_ttl: Option<String>,
}

impl UploadEngine {
    pub fn new(client: BackendClient, directory: Arc<dyn DirectoryAdapter>, config: &Config) -> Self {
        UploadEngine {
            client,
            directory,
            primary: config.primary_pool(),
            shadow: config.shadow_pool(),
            retry: config.retry,
            file_url_prefix: config.file_url_prefix.clone(),
            dev_env_enforced_ttl: (!config.dev_env_enforced_ttl.is_empty())
                .then(|| config.dev_env_enforced_ttl.clone()),
            redis_cache_ttl: (!config.redis_cache_ttl.is_empty()).then(|| config.redis_cache_ttl.clone()),
        }
    }

    /// Handles an already-parsed multipart upload at filer path `request_path` (or `/submit`
    /// for master-mode uploads). `query_ttl` is the `?ttl=` query parameter, if any, which
    /// overrides the form's `ttl` field.
    pub async fn handle_upload(
        &self,
        request_path: &str,
        parsed: ParsedUpload,
        query_ttl: Option<&str>,
        filer_mode: bool,
    ) -> ApiResult {
        let is_chunked_manifest = parsed.meta.is_some() && !parsed.files.is_empty();

        if parsed.files.is_empty() {
            return self.register_ttl_only(&parsed.paths, parsed.ttl.as_deref(), query_ttl).await;
        }

        let effective_ttl = self.effective_ttl(parsed.ttl.as_deref(), query_ttl);

        let outcome = if is_chunked_manifest {
            self.upload_chunked_manifest(&parsed.files[0], effective_ttl.as_deref()).await
        } else {
            self.upload_plain_all(request_path, &parsed.files, filer_mode, effective_ttl.as_deref())
                .await
        };

        match outcome {
            Ok(results) => ApiResult::ok(results),
            Err(e) if is_reset_by_peer(&e.to_string()) => ApiResult::connection_reset(),
            Err(e) => e.into_api_result(),
        }
    }

    fn effective_ttl(&self, form_ttl: Option<&str>, query_ttl: Option<&str>) -> Option<String> {
        self.dev_env_enforced_ttl
            .clone()
            .or_else(|| query_ttl.map(str::to_string))
            .or_else(|| form_ttl.map(str::to_string))
    }

    async fn register_ttl_only(
        &self,
        paths: &[String],
        form_ttl: Option<&str>,
        query_ttl: Option<&str>,
    ) -> ApiResult {
        if paths.is_empty() {
            return ProxyError::BadRequest("no file part in request".to_string()).into_api_result();
        }
        for path in paths {
            let (path_only, path_ttl) = split_ttl_suffix(path);
            let ttl = path_ttl
                .or_else(|| query_ttl.map(str::to_string))
                .or_else(|| form_ttl.map(str::to_string))
                .unwrap_or_default();

            if !is_path_eligible_for_ttl(&path_only) {
                tracing::info!(path = %path_only, "skipping ttl registration: path has too few segments");
                continue;
            }
            if let Err(e) = self.directory.set_path_meta(&path_only, &ttl).await {
                return ProxyError::from(e).into_api_result();
            }
        }
        ApiResult::ok(Vec::new())
    }

    async fn upload_plain_all(
        &self,
        request_path: &str,
        files: &[UploadPart],
        filer_mode: bool,
        ttl: Option<&str>,
    ) -> Result<Vec<FileMeta>, ProxyError> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            results.push(self.upload_plain(request_path, file, filer_mode, ttl).await?);
        }
        Ok(results)
    }

    async fn upload_plain(
        &self,
        request_path: &str,
        part: &UploadPart,
        filer_mode: bool,
        ttl: Option<&str>,
    ) -> Result<FileMeta, ProxyError> {
        let identity = self.assign_or_submit(request_path, part, filer_mode).await?;

        if filer_mode {
            let (dir, has_path) = crate::urlcompose::submit_root(request_path);
            let full_path = compose_filer_target_url(&dir, &part.file_name, has_path)?;
            let full_path = format!("{full_path}{}", file_leaf(&part.file_name));
            self.directory
                .cache_file_path(&full_path, &identity.fid, None)
                .await?;
            let _ = ttl;
        }

        Ok(FileMeta {
            file_name: part.file_name.clone(),
            fid: identity.fid.clone(),
            file_url: public_file_url(&self.file_url_prefix, &identity.fid),
            size: Some(part.bytes.len() as u64),
            public_url: identity.public_url,
            count: Some(identity.count.max(0) as u64),
            error: None,
        })
    }

    /// For filer-mode uploads, assigns an fid then uploads directly to the volume server in one
    /// round trip; for master-mode (`/submit`) uploads, posts straight to the master's own
    /// submit endpoint.
    async fn assign_or_submit(
        &self,
        request_path: &str,
        part: &UploadPart,
        filer_mode: bool,
    ) -> Result<FileIdentity, ProxyError> {
        if !filer_mode {
            return self.submit_to_master(part).await;
        }
        let identity = self.assign(1, None).await?;
        self.put_bytes(&identity.volume_url, &identity.fid, part.bytes.clone(), false)
            .await?;
        let _ = request_path;
        Ok(identity)
    }

    async fn submit_to_master(&self, part: &UploadPart) -> Result<FileIdentity, ProxyError> {
        let client = self.client.clone();
        let bytes = part.bytes.clone();
        let file_name = part.file_name.clone();
        with_failover(
            &self.primary,
            &self.shadow,
            Role::Master,
            self.retry,
            move |backend, _attempt| {
                let client = client.clone();
                let url = submit_url(backend);
                let bytes = bytes.clone();
                let file_name = file_name.clone();
                async move {
                    let boundary = "----weeder-submit-boundary";
                    let mut body = Vec::with_capacity(bytes.len() + 256);
                    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(&bytes);
                    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

                    let req = Request::post(url)
                        .header(
                            hyper::header::CONTENT_TYPE,
                            format!("multipart/form-data; boundary={boundary}"),
                        )
                        .body(Full::new(Bytes::from(body)))
                        .map_err(|e| ProxyError::Internal(e.to_string()))?;
                    let resp = client
                        .request(req)
                        .await
                        .map_err(|e| ProxyError::Upstream(e.to_string()))?;
                    if resp.status() != StatusCode::OK {
                        return Err(ProxyError::Upstream(format!("master submit returned {}", resp.status())));
                    }
                    let body = resp
                        .into_body()
                        .collect()
                        .await
                        .map_err(|e| ProxyError::Upstream(e.to_string()))?
                        .to_bytes();
                    let identity: FileIdentity =
                        serde_json::from_slice(&body).map_err(|e| ProxyError::Internal(e.to_string()))?;
                    if !identity.error.is_empty() {
                        return Err(ProxyError::Upstream(identity.error));
                    }
                    Ok(identity)
                }
            },
        )
        .await
    }

    async fn upload_chunked_manifest(
        &self,
        file: &UploadPart,
        ttl: Option<&str>,
    ) -> Result<Vec<FileMeta>, ProxyError> {
        let identity = self.assign(1, ttl).await?;
        self.put_bytes(&identity.volume_url, &identity.fid, file.bytes.clone(), true)
            .await?;

        let filer = self
            .primary
            .iter()
            .find(|b| b.role() == Role::Filer)
            .or_else(|| self.shadow.iter().find(|b| b.role() == Role::Filer))
            .ok_or_else(|| ProxyError::Upstream("no filer backend configured".to_string()))?;
        self.register_at_filer(filer, &identity.fid, &file.file_name).await?;

        Ok(vec![FileMeta {
            file_name: file.file_name.clone(),
            fid: identity.fid.clone(),
            file_url: public_file_url(&self.file_url_prefix, &identity.fid),
            size: Some(file.bytes.len() as u64),
            public_url: identity.public_url,
            count: Some(identity.count.max(0) as u64),
            error: None,
        }])
    }

    async fn register_at_filer(&self, filer: &Backend, fid: &str, path: &str) -> Result<(), ProxyError> {
        let url = format!("{}/admin/register", filer.base_url());
        let form = RegisterForm { file_id: fid, path };
        let body = serde_urlencoded::to_string(&form).map_err(|e| ProxyError::Internal(e.to_string()))?;
        let req = Request::post(url)
            .header(hyper::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| ProxyError::Internal(e.to_string()))?;
        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;
        if resp.status() != StatusCode::OK {
            return Err(ProxyError::Upstream(format!("filer register returned {}", resp.status())));
        }
        Ok(())
    }

    async fn assign(&self, count: u32, ttl: Option<&str>) -> Result<FileIdentity, ProxyError> {
        let client = self.client.clone();
        let ttl = ttl.map(str::to_string);
        with_failover(
            &self.primary,
            &self.shadow,
            Role::Master,
            self.retry,
            move |backend, _attempt| {
                let client = client.clone();
                let mut url = assign_url(backend, count, Some("001"));
                if let Some(ttl) = &ttl {
                    url.push_str("&ttl=");
                    url.push_str(ttl);
                }
                async move {
                    let req = Request::get(url)
                        .body(Full::new(Bytes::new()))
                        .map_err(|e| ProxyError::Internal(e.to_string()))?;
                    let resp = client
                        .request(req)
                        .await
                        .map_err(|e| ProxyError::Upstream(e.to_string()))?;
                    if resp.status() != StatusCode::OK {
                        return Err(ProxyError::Upstream(format!(
                            "master assign returned {}",
                            resp.status()
                        )));
                    }
                    let body = resp
                        .into_body()
                        .collect()
                        .await
                        .map_err(|e| ProxyError::Upstream(e.to_string()))?
                        .to_bytes();
                    let identity: FileIdentity =
                        serde_json::from_slice(&body).map_err(|e| ProxyError::Internal(e.to_string()))?;
                    if !identity.error.is_empty() || identity.count <= 0 {
                        return Err(ProxyError::Upstream(identity.error));
                    }
                    Ok(identity)
                }
            },
        )
        .await
    }

    async fn put_bytes(&self, volume_url: &str, fid: &str, bytes: Bytes, chunked: bool) -> Result<(), ProxyError> {
        let url = volume_upload_url(volume_url, fid, chunked);
        let req = Request::post(url)
            .body(Full::new(bytes))
            .map_err(|e| ProxyError::Internal(e.to_string()))?;
        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;
        if resp.status() != StatusCode::OK && resp.status() != StatusCode::CREATED {
            return Err(ProxyError::Upstream(format!("volume upload returned {}", resp.status())));
        }
        Ok(())
    }
}

fn file_leaf(file_name: &str) -> &str {
    file_name.rsplit('/').next().unwrap_or(file_name)
}

/// Splits a trailing `?ttl=<value>` suffix off a form `path` value, which takes priority over
/// both the query and form-level ttl for that path during TTL-only registration.
fn split_ttl_suffix(path: &str) -> (String, Option<String>) {
    match path.split_once("?ttl=") {
        Some((p, ttl)) => (p.to_string(), Some(ttl.to_string())),
        None => (path.to_string(), None),
    }
}
