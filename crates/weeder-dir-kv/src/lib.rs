#![forbid(unsafe_code)]

//! A [`weeder_core::DirectoryAdapter`] implementation backed by Redis, single-node or cluster.
//!
//! The store holds `path -> fid` and `fid -> path` as independent keys (prefixed `p2f:`/`f2p:`
//! to keep the two namespaces from colliding), a `weed-meta` hash of `folderPath -> ttl` for
//! [`DirectoryAdapter::set_path_meta`], and plain `SETEX` keys for [`DirectoryAdapter::cache_file_path`].

use async_trait::async_trait;
use redis::{aio::ConnectionManager, cluster_async::ClusterConnection, AsyncCommands};
use weeder_core::{DirError, DirErrorKind, DirectoryAdapter, Ttl};

const META_HASH: &str = "weed-meta";

fn path_key(path: &str) -> String {
    format!("p2f:{path}")
}

fn fid_key(fid: &str) -> String {
    format!("f2p:{fid}")
}

enum Conn {
    Single(ConnectionManager),
    Cluster(ClusterConnection),
}

impl Clone for Conn {
    fn clone(&self) -> Self {
        match self {
            Conn::Single(c) => Conn::Single(c.clone()),
            Conn::Cluster(c) => Conn::Cluster(c.clone()),
        }
    }
}

/// A [`DirectoryAdapter`] storing the path<->fid mapping in Redis.
pub struct KvDirectoryAdapter {
    conn: Conn,
}

impl std::fmt::Debug for KvDirectoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvDirectoryAdapter").finish_non_exhaustive()
    }
}

impl KvDirectoryAdapter {
    /// Connects to `addr`. Cluster mode is selected when `addr` contains a comma
    /// (multiple `host:port` pairs); otherwise a single-node client is used.
    ///
    /// When cluster mode is requested, a cluster client is attempted first; if that
    /// fails to build a topology the adapter falls back to treating the first address
    /// as a single node.
    pub async fn connect(addr: &str, password: Option<&str>, database: i64) -> Result<Self, DirError> {
        let nodes: Vec<&str> = addr.split(',').map(str::trim).collect();

        if nodes.len() > 1 {
            let urls: Vec<String> = nodes.iter().map(|n| node_url(n, password, database)).collect();
            match redis::cluster::ClusterClientBuilder::new(urls).build() {
                Ok(client) => {
                    return client
                        .get_async_connection()
                        .await
                        .map(|c| KvDirectoryAdapter { conn: Conn::Cluster(c) })
                        .map_err(|e| DirError::new(DirErrorKind::BackendUnavailable, e));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cluster client build failed, falling back to single node");
                }
            }
        }

        let url = node_url(nodes[0], password, database);
        let client = redis::Client::open(url).map_err(|e| DirError::new(DirErrorKind::BackendUnavailable, e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| DirError::new(DirErrorKind::BackendUnavailable, e))?;
        Ok(KvDirectoryAdapter { conn: Conn::Single(conn) })
    }
}

fn node_url(hostport: &str, password: Option<&str>, database: i64) -> String {
    match password {
        Some(p) if !p.is_empty() => format!("redis://:{p}@{hostport}/{database}"),
        _ => format!("redis://{hostport}/{database}"),
    }
}

#[async_trait]
impl DirectoryAdapter for KvDirectoryAdapter {
    async fn get_file_id(&self, path: &str) -> Result<String, DirError> {
        let key = path_key(path);
        let value: Option<String> = match self.conn.clone() {
            Conn::Single(mut c) => c.get(&key).await,
            Conn::Cluster(mut c) => c.get(&key).await,
        }
        .map_err(|e| DirError::new(DirErrorKind::BackendUnavailable, e))?;
        value.ok_or_else(|| DirErrorKind::NotFound.into())
    }

    async fn get_file_full_path(&self, fid: &str) -> Result<String, DirError> {
        let key = fid_key(fid);
        let value: Option<String> = match self.conn.clone() {
            Conn::Single(mut c) => c.get(&key).await,
            Conn::Cluster(mut c) => c.get(&key).await,
        }
        .map_err(|e| DirError::new(DirErrorKind::BackendUnavailable, e))?;
        value.ok_or_else(|| DirErrorKind::NotFound.into())
    }

    async fn set_path_meta(&self, path: &str, ttl: &str) -> Result<(), DirError> {
        match self.conn.clone() {
            Conn::Single(mut c) => c.hset(META_HASH, path, ttl).await,
            Conn::Cluster(mut c) => c.hset(META_HASH, path, ttl).await,
        }
        .map_err(|e| DirError::new(DirErrorKind::BackendUnavailable, e))
    }

    async fn cache_file_path(&self, path: &str, fid: &str, ttl: Option<&Ttl>) -> Result<(), DirError> {
        let key = path_key(path);
        let fid_key = fid_key(fid);
        let seconds = ttl.map(|t| t.as_duration().as_secs()).unwrap_or(Ttl::default().as_duration().as_secs());
        let result: redis::RedisResult<()> = match self.conn.clone() {
            Conn::Single(mut c) => match c.set_ex(&key, fid, seconds).await {
                Ok(()) => c.set_ex(&fid_key, path, seconds).await,
                Err(e) => Err(e),
            },
            Conn::Cluster(mut c) => match c.set_ex(&key, fid, seconds).await {
                Ok(()) => c.set_ex(&fid_key, path, seconds).await,
                Err(e) => Err(e),
            },
        };
        result.map_err(|e| DirError::new(DirErrorKind::BackendUnavailable, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_url_embeds_password_and_database() {
        assert_eq!(node_url("localhost:6379", Some("secret"), 2), "redis://:secret@localhost:6379/2");
        assert_eq!(node_url("localhost:6379", None, 0), "redis://localhost:6379/0");
    }

    #[test]
    fn namespaces_keys_by_direction() {
        assert_eq!(path_key("/a/b"), "p2f:/a/b");
        assert_eq!(fid_key("19,2cc8a17085"), "f2p:19,2cc8a17085");
    }
}
