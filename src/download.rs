//! Download engine (C7): resolves a path or fid to its backing volume, fetches the blob with
//! primary-then-shadow failover, and overrides the backend's reported content type for a
//! handful of extensions office tools insist on sniffing.

use crate::config::Config;
use crate::error::ProxyError;
use crate::httpclient::BackendClient;
use crate::retry::with_failover;
use crate::urlcompose::volume_download_url;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use weeder_core::{Backend, DirectoryAdapter, Role};

/// A fetched blob, ready to be written back to the client.
pub struct DownloadedFile {
    pub bytes: Bytes,
    pub content_type: String,
}

pub struct DownloadEngine {
    client: BackendClient,
    directory: Arc<dyn DirectoryAdapter>,
    primary: Vec<Backend>,
    shadow: Vec<Backend>,
    retry: usize,
}

impl DownloadEngine {
    pub fn new(client: BackendClient, directory: Arc<dyn DirectoryAdapter>, config: &Config) -> Self {
        DownloadEngine {
            client,
            directory,
            primary: config.primary_pool(),
            shadow: config.shadow_pool(),
            retry: config.retry,
        }
    }

    /// Downloads by filer path: resolves the fid via the directory adapter, then fetches it.
    /// The response's content type is overridden based on `path`'s extension.
    pub async fn download_by_path(&self, path: &str) -> Result<DownloadedFile, ProxyError> {
        let fid = self.directory.get_file_id(path).await?;
        let file = self.download_by_fid(&fid).await?;
        Ok(apply_mime_override(file, extension_of(path)))
    }

    /// Downloads a blob directly by fid, round-robining across volume backends. No MIME
    /// override is applied since a bare fid carries no filename.
    pub async fn download_by_fid(&self, fid: &str) -> Result<DownloadedFile, ProxyError> {
        let client = self.client.clone();
        let fid = fid.to_string();
        with_failover(
            &self.primary,
            &self.shadow,
            Role::Volume,
            self.retry,
            move |backend, _attempt| {
                let client = client.clone();
                let url = volume_download_url(backend.base_url(), &fid);
                async move { fetch(&client, &url).await }
            },
        )
        .await
    }
}

fn extension_of(path: &str) -> Option<&str> {
    path.rsplit('.').next().filter(|ext| *ext != path)
}

async fn fetch(client: &BackendClient, url: &str) -> Result<DownloadedFile, ProxyError> {
    let req = Request::get(url)
        .body(Full::new(Bytes::new()))
        .map_err(|e| ProxyError::Internal(e.to_string()))?;
    let resp = client
        .request(req)
        .await
        .map_err(|e| ProxyError::Upstream(e.to_string()))?;

    match resp.status() {
        StatusCode::OK => read_body(resp).await,
        StatusCode::NOT_FOUND => Err(ProxyError::NotFound(format!("not found: {url}"))),
        other => Err(ProxyError::Upstream(format!("backend returned {other}"))),
    }
}

async fn read_body(resp: Response<hyper::body::Incoming>) -> Result<DownloadedFile, ProxyError> {
    let content_type = resp
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .map_err(|e| {
            if crate::error::is_reset_by_peer(&e.to_string()) {
                ProxyError::ConnectionReset
            } else {
                ProxyError::Upstream(e.to_string())
            }
        })?
        .to_bytes();
    Ok(DownloadedFile { bytes, content_type })
}

/// These extensions are served with their canonical MIME type regardless of what the backend
/// reports, because desktop office suites refuse to open them under `application/octet-stream`.
fn apply_mime_override(mut file: DownloadedFile, ext: Option<&str>) -> DownloadedFile {
    if let Some(mime) = ext.and_then(mime_for_extension) {
        file.content_type = mime.to_string();
    }
    file
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "xls" => Some("application/vnd.ms-excel"),
        "xlsx" => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        "csv" => Some("text/csv"),
        "doc" => Some("application/msword"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_xlsx_mime_type() {
        let file = DownloadedFile {
            bytes: Bytes::new(),
            content_type: "application/octet-stream".to_string(),
        };
        let overridden = apply_mime_override(file, extension_of("/reports/q1.xlsx"));
        assert_eq!(
            overridden.content_type,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
    }

    #[test]
    fn leaves_unknown_extensions_untouched() {
        let file = DownloadedFile {
            bytes: Bytes::new(),
            content_type: "application/octet-stream".to_string(),
        };
        let overridden = apply_mime_override(file, extension_of("/blobs/19,2cc8a17085"));
        assert_eq!(overridden.content_type, "application/octet-stream");
    }
}
