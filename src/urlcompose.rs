//! URL composition and backend selection (C4): `selectBackend`, filer target URLs, and the
//! master `/dir/assign` and `/submit` endpoints.

use crate::error::ProxyError;
use weeder_core::{Backend, Role};

/// Picks a backend from `pool` deterministically as a pure function of `(role, attempt)`: no
/// stateful counters, so concurrent requests never interfere with each other's round-robin
/// position. When only one backend is configured its role is ignored. Returns `None` if no
/// backend of the given role exists (and more than one backend is configured).
pub fn select_backend(pool: &[Backend], role: Role, attempt: usize) -> Option<&Backend> {
    if pool.len() == 1 {
        return pool.first();
    }
    let of_role: Vec<&Backend> = pool.iter().filter(|b| b.role() == role).collect();
    if of_role.is_empty() {
        return None;
    }
    Some(of_role[attempt % of_role.len()])
}

/// Strips the leading `/filer` prefix from a filer-upload request path, reporting whether any
/// path segments remain beyond it.
pub fn submit_root(filer_request_path: &str) -> (String, bool) {
    let rest = filer_request_path.strip_prefix("/filer").unwrap_or(filer_request_path);
    let has_path = !rest.trim_matches('/').is_empty();
    (rest.to_string(), has_path)
}

/// Resolves the directory a file should be uploaded into: `submit_root + dir-of(filename)`.
/// Filenames ending in `/null` are rejected. When `has_path` is false and `filename` has no
/// `/` of its own, the upload is ambiguous and rejected.
pub fn compose_filer_target_url(
    submit_root: &str,
    filename: &str,
    has_path: bool,
) -> Result<String, ProxyError> {
    if filename.ends_with("/null") {
        return Err(ProxyError::NullFilename);
    }
    let dir = match filename.rfind('/') {
        Some(idx) => &filename[..=idx],
        None => "",
    };
    if !has_path && dir.is_empty() {
        return Err(ProxyError::BadRequest("a /module/ path is needed".to_string()));
    }
    Ok(format!("{submit_root}{dir}"))
}

/// `GET <master>/dir/assign?count=<n>&replication=<r>`
pub fn assign_url(master: &Backend, count: u32, replication: Option<&str>) -> String {
    let mut url = format!("{}/dir/assign?count={}", master.base_url(), count);
    if let Some(r) = replication {
        url.push_str("&replication=");
        url.push_str(r);
    }
    url
}

/// `POST <master>/submit` for the single-shot (non-chunked) upload path.
pub fn submit_url(master: &Backend) -> String {
    format!("{}/submit", master.base_url())
}

/// `POST <volume_url>/<fid>` plain upload, or with `?cm=true` for a chunked-manifest part.
pub fn volume_upload_url(volume_url: &str, fid: &str, chunked: bool) -> String {
    if chunked {
        format!("{}/{}?cm=true", volume_url.trim_end_matches('/'), fid)
    } else {
        format!("{}/{}", volume_url.trim_end_matches('/'), fid)
    }
}

/// `GET <volume_url>/<fid>` download target.
pub fn volume_download_url(volume_url: &str, fid: &str) -> String {
    format!("{}/{}", volume_url.trim_end_matches('/'), fid)
}

/// `DELETE <volume_url>/<fid>`.
pub fn volume_delete_url(volume_url: &str, fid: &str) -> String {
    format!("{}/{}", volume_url.trim_end_matches('/'), fid)
}

/// Public URL clients should use to fetch `fid`: `fileUrlPrefix + fid`.
pub fn public_file_url(file_url_prefix: &str, fid: &str) -> String {
    format!("{}{}", file_url_prefix, fid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<Backend> {
        vec![
            Backend::new("http://v1:8080".to_string(), Role::Volume),
            Backend::new("http://v2:8080".to_string(), Role::Volume),
            Backend::new("http://m1:9333".to_string(), Role::Master),
        ]
    }

    #[test]
    fn select_backend_round_robins_within_role() {
        let pool = pool();
        let a = select_backend(&pool, Role::Volume, 0).unwrap();
        let b = select_backend(&pool, Role::Volume, 1).unwrap();
        let c = select_backend(&pool, Role::Volume, 2).unwrap();
        assert_eq!(a.base_url(), "http://v1:8080");
        assert_eq!(b.base_url(), "http://v2:8080");
        assert_eq!(c.base_url(), a.base_url());
    }

    #[test]
    fn select_backend_none_for_missing_role() {
        let pool = pool();
        assert!(select_backend(&pool, Role::Filer, 0).is_none());
    }

    #[test]
    fn single_backend_ignores_role() {
        let pool = vec![Backend::new("http://only:8080".to_string(), Role::Filer)];
        let b = select_backend(&pool, Role::Volume, 3).unwrap();
        assert_eq!(b.base_url(), "http://only:8080");
    }

    #[test]
    fn submit_root_detects_remaining_path() {
        assert_eq!(submit_root("/filer/a/b"), ("/a/b".to_string(), true));
        assert_eq!(submit_root("/filer/"), ("/".to_string(), false));
        assert_eq!(submit_root("/filer"), ("".to_string(), false));
    }

    #[test]
    fn compose_filer_target_url_rejects_null_filename() {
        assert!(compose_filer_target_url("/a", "foo/null", true).is_err());
    }

    #[test]
    fn compose_filer_target_url_requires_a_path() {
        assert!(compose_filer_target_url("", "plainname.txt", false).is_err());
        assert_eq!(
            compose_filer_target_url("", "dir/plainname.txt", false).unwrap(),
            "dir/"
        );
    }

    #[test]
    fn volume_upload_url_appends_cm_flag() {
        assert_eq!(
            volume_upload_url("http://v1:8080", "3,01637037d6", true),
            "http://v1:8080/3,01637037d6?cm=true"
        );
        assert_eq!(
            volume_upload_url("http://v1:8080", "3,01637037d6", false),
            "http://v1:8080/3,01637037d6"
        );
    }
}
