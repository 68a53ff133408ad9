//! Retry controller with shadow-pool failover (C10).
//!
//! A backend call is attempted against the primary pool up to `retry` times; `selectBackend`
//! picks a fresh backend each attempt via `attempt mod pool.len()`, so no two attempts in a
//! row necessarily hit the same volume server. If every primary attempt returns a retryable
//! [`ProxyError`] and a shadow pool is configured, the same number of attempts is made against
//! it before giving up.

use crate::error::ProxyError;
use crate::metrics::BACKEND_CALLS_TOTAL;
use crate::urlcompose::select_backend;
use std::future::Future;
use weeder_core::{Backend, Role};

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Master => "master",
        Role::Volume => "volume",
        Role::Filer => "filer",
    }
}

/// Runs `call` against `primary`, then `shadow`, retrying up to `attempts` times per pool.
///
/// `call` receives the chosen backend and the zero-based attempt index; it should return
/// `Err(ProxyError::Upstream(_))` for failures that deserve another attempt and any other
/// error for failures that should abort immediately.
pub async fn with_failover<F, Fut, T>(
    primary: &[Backend],
    shadow: &[Backend],
    role: Role,
    attempts: usize,
    mut call: F,
) -> Result<T, ProxyError>
where
    F: FnMut(&Backend, usize) -> Fut,
    Fut: Future<Output = Result<T, ProxyError>>,
{
    let attempts = attempts.max(1);
    let mut last_err = None;
    let label = role_label(role);

    for attempt in 0..attempts {
        let Some(backend) = select_backend(primary, role, attempt) else {
            break;
        };
        match call(backend, attempt).await {
            Ok(v) => {
                BACKEND_CALLS_TOTAL.with_label_values(&[label, "ok"]).inc();
                return Ok(v);
            }
            Err(e) if e.is_retryable() => {
                BACKEND_CALLS_TOTAL.with_label_values(&[label, "retry"]).inc();
                last_err = Some(e);
            }
            Err(e) => {
                BACKEND_CALLS_TOTAL.with_label_values(&[label, "error"]).inc();
                return Err(e);
            }
        }
    }

    if !shadow.is_empty() {
        for attempt in 0..attempts {
            let Some(backend) = select_backend(shadow, role, attempt) else {
                break;
            };
            match call(backend, attempt).await {
                Ok(v) => {
                    BACKEND_CALLS_TOTAL.with_label_values(&[label, "ok"]).inc();
                    return Ok(v);
                }
                Err(e) if e.is_retryable() => {
                    BACKEND_CALLS_TOTAL.with_label_values(&[label, "retry"]).inc();
                    last_err = Some(e);
                }
                Err(e) => {
                    BACKEND_CALLS_TOTAL.with_label_values(&[label, "error"]).inc();
                    return Err(e);
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ProxyError::Upstream("no backend configured".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(n: usize, role: Role) -> Vec<Backend> {
        (0..n)
            .map(|i| Backend::new(format!("http://v{i}:8080"), role))
            .collect()
    }

    #[tokio::test]
    async fn succeeds_on_first_primary_attempt() {
        let primary = pool(2, Role::Volume);
        let shadow: Vec<Backend> = Vec::new();
        let calls = AtomicUsize::new(0);
        let result = with_failover(&primary, &shadow, Role::Volume, 3, |_b, _a| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProxyError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_over_to_shadow_after_primary_exhausted() {
        let primary = pool(1, Role::Volume);
        let shadow = pool(1, Role::Volume);
        let result = with_failover(&primary, &shadow, Role::Volume, 2, |b, _a| {
            let is_shadow = b.base_url().contains("v0") && b.base_url() == shadow[0].base_url();
            async move {
                if is_shadow {
                    Ok::<_, ProxyError>("shadow")
                } else {
                    Err(ProxyError::Upstream("primary down".to_string()))
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "shadow");
    }

    #[tokio::test]
    async fn non_retryable_error_aborts_immediately() {
        let primary = pool(2, Role::Volume);
        let shadow: Vec<Backend> = Vec::new();
        let calls = AtomicUsize::new(0);
        let result: Result<(), ProxyError> = with_failover(&primary, &shadow, Role::Volume, 3, |_b, _a| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProxyError::AccessDenied("nope".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
