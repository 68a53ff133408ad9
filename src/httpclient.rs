//! Shared hyper client used for every backend call the proxy makes (master, volume, filer).
//!
//! One client is built at startup and cloned (hyper-util's legacy client is cheaply
//! cloneable, backed by an `Arc`'d connection pool) into every request-handling task, giving
//! every backend call a bounded, reused pool of idle connections per host.

use bytes::Bytes;
use http_body_util::Full;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

pub type BackendClient = Client<HttpConnector, Full<Bytes>>;

/// Builds the shared client. `max_idle_per_host` mirrors config's `maxIdleConnsPerHost`.
pub fn build_client(max_idle_per_host: usize) -> BackendClient {
    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(90))
        .build_http()
}
