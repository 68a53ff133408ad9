//! Query engine (C9): resolves `?filepath=` to a fid, or `?fid=` back to its bound path,
//! without touching any volume server.

use crate::error::ProxyError;
use crate::model::{ApiResult, FileMeta};
use std::sync::Arc;
use weeder_core::{DirErrorKind, DirectoryAdapter};

pub struct QueryEngine {
    directory: Arc<dyn DirectoryAdapter>,
}

impl QueryEngine {
    pub fn new(directory: Arc<dyn DirectoryAdapter>) -> Self {
        QueryEngine { directory }
    }

    /// Handles `?filepath`: the request segment is a fid, resolved to its registered path via
    /// the directory adapter's reverse mapping.
    pub async fn by_filepath_query(&self, fid: &str) -> ApiResult {
        match self.directory.get_file_full_path(fid).await {
            Ok(path) => ApiResult::ok(vec![FileMeta {
                file_name: path,
                fid: fid.to_string(),
                ..Default::default()
            }]),
            Err(e) if e.kind() == DirErrorKind::NotFound => {
                ApiResult::query_miss(404, fid, "", "filepath not found")
            }
            Err(e) => ProxyError::from(e).into_api_result(),
        }
    }

    /// Handles `?fid`: the request segment is a path, resolved to its bound fid.
    pub async fn by_fid_query(&self, path: &str) -> ApiResult {
        match self.directory.get_file_id(path).await {
            Ok(fid) => ApiResult::ok(vec![FileMeta {
                file_name: path.to_string(),
                fid,
                ..Default::default()
            }]),
            Err(e) if e.kind() == DirErrorKind::NotFound => {
                ApiResult::query_miss(404, "", path, "fid not found")
            }
            Err(e) => ProxyError::from(e).into_api_result(),
        }
    }
}
