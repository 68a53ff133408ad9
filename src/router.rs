//! Router (C5): maps `(method, path)` to one of the proxy's operations. Dispatch is a pure
//! function so it can be unit-tested without spinning up a server.

use once_cell::sync::Lazy;
use regex::Regex;

/// The shape of a direct fid path: exactly one leading slash and no other slash, e.g.
/// `/3,01637037d6`. Anything matching this is treated as a fid, not a filer path.
static FID_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/[^/]*$").unwrap());

/// The default "unknown URI" denylist pattern: a literal pipe or any whitespace/quote.
pub const DEFAULT_UNKNOWN_URI_PATTERN: &str = r#"|\s""#;

/// The operation a request maps to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Route {
    Health,
    Echo,
    /// `POST /submit`: master-mode multipart upload.
    Submit,
    /// `POST /delete` with form field `path`.
    DeleteByForm,
    /// Rejected outright by the unknown-URI denylist.
    Denied,
    /// `GET /`: filer listing of the root, subject to the read whitelist.
    Root,
    /// `POST /filer/<p>`: filer-mode upload at path `p`.
    FilerUpload { path: String },
    /// A path matching the fid shape: `GET` fetches or queries, `DELETE` removes.
    Fid { fid: String },
    /// `GET /public/…`: open read, regardless of whitelist.
    Public { path: String },
    /// Any other filer path: read-white gated `GET`, or `DELETE`.
    FilerPath { path: String },
    MethodNotAllowed,
}

/// Dispatches a request by method, path, and the configured unknown-URI pattern (query string
/// already stripped from `path`).
pub fn route(method: &http::Method, path: &str, unknown_uri: &Regex) -> Route {
    if unknown_uri.is_match(path) {
        return Route::Denied;
    }

    match path {
        "/health" => return Route::Health,
        "/echo" => return Route::Echo,
        "/submit" if method == http::Method::POST => return Route::Submit,
        "/delete" if method == http::Method::POST => return Route::DeleteByForm,
        "/" => return Route::Root,
        _ => {}
    }

    if let Some(rest) = path.strip_prefix("/filer") {
        if method == http::Method::POST {
            return Route::FilerUpload {
                path: rest.to_string(),
            };
        }
    }

    if FID_SHAPE.is_match(path) {
        if matches!(*method, http::Method::GET | http::Method::DELETE) {
            return Route::Fid {
                fid: path.trim_start_matches('/').to_string(),
            };
        }
        return Route::MethodNotAllowed;
    }

    if let Some(rest) = path.strip_prefix("/public/") {
        return Route::Public {
            path: rest.to_string(),
        };
    }

    if matches!(*method, http::Method::GET | http::Method::DELETE) {
        return Route::FilerPath {
            path: path.to_string(),
        };
    }

    Route::MethodNotAllowed
}

/// Builds the unknown-URI matcher from a config pattern, falling back to the default on a
/// malformed pattern rather than failing startup.
pub fn unknown_uri_matcher(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|_| Regex::new(DEFAULT_UNKNOWN_URI_PATTERN).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn matcher() -> Regex {
        unknown_uri_matcher(DEFAULT_UNKNOWN_URI_PATTERN)
    }

    #[test]
    fn matches_fixed_routes() {
        let m = matcher();
        assert_eq!(route(&Method::GET, "/health", &m), Route::Health);
        assert_eq!(route(&Method::GET, "/echo", &m), Route::Echo);
        assert_eq!(route(&Method::POST, "/submit", &m), Route::Submit);
        assert_eq!(route(&Method::POST, "/delete", &m), Route::DeleteByForm);
        assert_eq!(route(&Method::GET, "/", &m), Route::Root);
    }

    #[test]
    fn matches_filer_upload() {
        let m = matcher();
        assert_eq!(
            route(&Method::POST, "/filer/buckets/a/b.txt", &m),
            Route::FilerUpload {
                path: "/buckets/a/b.txt".to_string()
            }
        );
    }

    #[test]
    fn matches_fid_shape_single_segment_only() {
        let m = matcher();
        assert_eq!(
            route(&Method::GET, "/19,2cc8a17085", &m),
            Route::Fid {
                fid: "19,2cc8a17085".to_string()
            }
        );
        assert_eq!(
            route(&Method::DELETE, "/19,2cc8a17085", &m),
            Route::Fid {
                fid: "19,2cc8a17085".to_string()
            }
        );
        // A second slash disqualifies the fid shape; falls through to a filer path instead.
        assert_eq!(
            route(&Method::GET, "/a/b", &m),
            Route::FilerPath {
                path: "/a/b".to_string()
            }
        );
    }

    #[test]
    fn matches_public_prefix() {
        let m = matcher();
        assert_eq!(
            route(&Method::GET, "/public/echo/echo.png", &m),
            Route::Public {
                path: "echo/echo.png".to_string()
            }
        );
    }

    #[test]
    fn denies_unknown_uri_pattern() {
        let m = matcher();
        assert_eq!(route(&Method::GET, "/a|b", &m), Route::Denied);
        assert_eq!(route(&Method::GET, "/a b", &m), Route::Denied);
    }
}
