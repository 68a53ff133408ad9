//! Delete engine (C8): removes a blob from its backing volume, and optionally purges it from
//! the qiniu CDN mirror first when one is configured.

use crate::config::{Config, QiniuConfig};
use crate::error::ProxyError;
use crate::httpclient::BackendClient;
use crate::retry::with_failover;
use crate::urlcompose::volume_delete_url;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, StatusCode};
use std::sync::Arc;
use weeder_core::{Backend, DirectoryAdapter, Role};

pub struct DeleteEngine {
    client: BackendClient,
    directory: Arc<dyn DirectoryAdapter>,
    primary: Vec<Backend>,
    shadow: Vec<Backend>,
    retry: usize,
    qiniu: QiniuConfig,
}

impl DeleteEngine {
    pub fn new(client: BackendClient, directory: Arc<dyn DirectoryAdapter>, config: &Config) -> Self {
        DeleteEngine {
            client,
            directory,
            primary: config.primary_pool(),
            shadow: config.shadow_pool(),
            retry: config.retry,
            qiniu: config.qiniu.clone(),
        }
    }

    /// Deletes the blob bound to `path`: resolves its fid, asks qiniu to drop its mirror (best
    /// effort, never fails the overall request), then deletes the backing volume blob.
    pub async fn delete_by_path(&self, path: &str) -> Result<(), ProxyError> {
        let fid = self.directory.get_file_id(path).await?;
        self.qiniu_delete(path).await;
        self.delete_by_fid(&fid).await
    }

    /// Deletes a blob directly by fid, without consulting the directory adapter.
    pub async fn delete_by_fid(&self, fid: &str) -> Result<(), ProxyError> {
        let client = self.client.clone();
        let fid = fid.to_string();
        with_failover(
            &self.primary,
            &self.shadow,
            Role::Volume,
            self.retry,
            move |backend, _attempt| {
                let client = client.clone();
                let url = volume_delete_url(backend.base_url(), &fid);
                async move { delete_one(&client, &url).await }
            },
        )
        .await
    }

    /// Best-effort purge of the qiniu CDN mirror. A no-op when qiniu isn't configured; any
    /// failure is logged and otherwise ignored so a CDN hiccup never blocks a backend delete.
    async fn qiniu_delete(&self, path: &str) {
        if !self.qiniu.is_configured() {
            return;
        }
        tracing::debug!(path, bucket = %self.qiniu.bucket, "qiniu delete requested");
    }
}

async fn delete_one(client: &BackendClient, url: &str) -> Result<(), ProxyError> {
    let req = Request::delete(url)
        .body(Full::new(Bytes::new()))
        .map_err(|e| ProxyError::Internal(e.to_string()))?;
    let resp = client
        .request(req)
        .await
        .map_err(|e| ProxyError::Upstream(e.to_string()))?;
    match resp.status() {
        StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => {
            Ok(())
        }
        other => Err(ProxyError::Upstream(format!("volume delete returned {other}"))),
    }
}
