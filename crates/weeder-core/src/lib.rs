//! Core traits and types shared by weeder's pluggable directory-adapter back-ends.
//!
//! A directory adapter maintains the proxy's `path <-> fid` mapping and per-path TTL
//! metadata. Pre-made implementations live in `weeder-dir-sql` (a relational table) and
//! `weeder-dir-kv` (a Redis single-node or cluster deployment); you can implement
//! [`DirectoryAdapter`] yourself to back the proxy with any other store.

mod error;
mod ttl;

pub use error::{DirError, DirErrorKind};
pub use ttl::{Ttl, TtlParseError};

use async_trait::async_trait;
use std::fmt::Debug;

/// The role a configured backend plays in the cluster.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Role {
    /// Allocates fids and reports cluster topology.
    Master,
    /// Stores byte containers addressed by fid.
    Volume,
    /// Maintains the hierarchical path -> fid directory.
    Filer,
}

/// A single configured backend endpoint.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Backend {
    /// Base URL of the backend, e.g. `http://10.0.0.1:9333`.
    pub url: String,
    /// The role this backend plays.
    pub role: Role,
}

impl Backend {
    /// Creates a new backend descriptor.
    pub fn new(url: impl Into<String>, role: Role) -> Self {
        Backend { url: url.into(), role }
    }

    /// The base URL of this backend, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// The role this backend plays in the cluster.
    pub fn role(&self) -> Role {
        self.role
    }
}

/// Path-level TTL metadata persisted by a [`DirectoryAdapter`].
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PathMeta {
    /// The folder path the TTL applies to.
    pub folder_path: String,
    /// The raw TTL grammar string, e.g. `"3m"`.
    pub ttl: String,
    /// Creation time, seconds since epoch.
    pub create_time: i64,
    /// Last update time, seconds since epoch, absent on first insert.
    pub update_time: Option<i64>,
}

/// The capability a path <-> fid directory store must provide.
///
/// Implementations must be safe to share across concurrently serving request workers.
#[async_trait]
pub trait DirectoryAdapter: Debug + Send + Sync {
    /// Resolves a filer path to the fid bound to it.
    async fn get_file_id(&self, path: &str) -> Result<String, DirError>;

    /// Resolves a fid to the filer path it is bound to.
    async fn get_file_full_path(&self, fid: &str) -> Result<String, DirError>;

    /// Persists a TTL policy for a folder path.
    async fn set_path_meta(&self, path: &str, ttl: &str) -> Result<(), DirError>;

    /// Caches a path -> fid binding with an expiry, independent of `set_path_meta`.
    ///
    /// A `ttl` of `None` means the adapter should use its own configured default, or skip
    /// caching entirely if it has none.
    async fn cache_file_path(&self, path: &str, fid: &str, ttl: Option<&Ttl>) -> Result<(), DirError>;
}
