//! Health sampler (C11): periodically polls each volume backend's status endpoint and tracks
//! how many consecutive checks have failed, so the router can route around a backend before
//! it starts timing out live requests.

use crate::config::Config;
use crate::httpclient::BackendClient;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use weeder_core::Backend;

/// Tracks consecutive check failures per backend URL.
#[derive(Default)]
struct Topology {
    failures: HashMap<String, u64>,
}

/// Shared, continuously-updated view of cluster health.
pub struct HealthSampler {
    client: BackendClient,
    backends: Vec<Backend>,
    check_url_suffix: String,
    base_line: u64,
    node_base_line: u64,
    topology: Arc<RwLock<Topology>>,
}

impl HealthSampler {
    pub fn new(client: BackendClient, config: &Config) -> Self {
        let mut backends = config.primary_pool();
        backends.extend(config.shadow_pool());
        HealthSampler {
            client,
            backends,
            check_url_suffix: config.volume_check_url.clone(),
            base_line: config.volume_check_base_line.max(1),
            node_base_line: config.node_check_base_line.max(1),
            topology: Arc::new(RwLock::new(Topology::default())),
        }
    }

    /// Runs the poll loop forever at `interval`, intended to be spawned as a background task.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    async fn poll_once(&self) {
        for backend in &self.backends {
            let healthy = self.check_one(backend).await;
            let mut topology = self.topology.write().await;
            let entry = topology.failures.entry(backend.base_url().to_string()).or_insert(0);
            if healthy {
                *entry = 0;
            } else {
                *entry += 1;
            }
        }
    }

    async fn check_one(&self, backend: &Backend) -> bool {
        let url = format!("{}{}", backend.base_url(), self.check_url_suffix);
        let req = match Request::get(url).body(Full::new(Bytes::new())) {
            Ok(r) => r,
            Err(_) => return false,
        };
        match self.client.request(req).await {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(_) => false,
        }
    }

    /// Whether `backend` has failed at least `volumeCheckBaseLine` consecutive polls, and
    /// should be skipped by the retry controller's backend selection.
    pub async fn is_down(&self, backend: &Backend) -> bool {
        let topology = self.topology.read().await;
        topology
            .failures
            .get(backend.base_url())
            .is_some_and(|&n| n >= self.base_line)
    }

    /// Backends still considered healthy, for the `/health` endpoint summary.
    pub async fn healthy_backends(&self) -> Vec<String> {
        let topology = self.topology.read().await;
        self.backends
            .iter()
            .filter(|b| {
                topology
                    .failures
                    .get(b.base_url())
                    .is_none_or(|&n| n < self.node_base_line)
            })
            .map(|b| b.base_url().to_string())
            .collect()
    }
}

/// Body returned by `GET /health`.
pub async fn health_summary(sampler: &HealthSampler) -> serde_json::Value {
    serde_json::json!({
        "status": "ok",
        "healthy": sampler.healthy_backends().await,
    })
}

/// Body returned by `GET /echo`: a liveness check that never touches a backend.
pub fn echo() -> &'static str {
    "ok"
}
