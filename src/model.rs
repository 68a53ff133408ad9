//! Data model shared across the router, upload/download/delete/query engines, and access log.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub use weeder_core::{Backend, PathMeta, Role};

/// Per-request context created when a request enters the router and dropped on response.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// `Request-Id` header value, or a random <=8-digit decimal if absent.
    pub trace_id: String,
    /// `X-Real-IP` header value, or the socket's remote address.
    pub client_addr: IpAddr,
    /// `Uni-Source` header value, empty string if absent.
    pub user_id: String,
    /// The HTTP method of the request.
    pub method: http::Method,
    /// The request path (not including query string).
    pub path: String,
    /// The current retry attempt number, starting at 0.
    pub attempt: usize,
}

/// The result of assigning or uploading a single file, as returned by a volume/master call.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileIdentity {
    /// Compact file identifier, e.g. `"19,2cc8a17085"`.
    #[serde(default)]
    pub fid: String,
    /// URL of the volume server that holds (or will hold) the blob.
    #[serde(default, rename = "url")]
    pub volume_url: String,
    /// Publicly reachable URL of the same volume server, if different from `volume_url`.
    #[serde(default, rename = "publicUrl")]
    pub public_url: String,
    /// Number of needles assigned (replication count); `count <= 0` marks a failed assignment.
    #[serde(default)]
    pub count: i64,
    /// Non-empty when the backend reports a failure in-band rather than via HTTP status.
    #[serde(default)]
    pub error: String,
}

/// One uploaded (or looked-up) file, as returned to proxy clients.
#[derive(Clone, Debug, Default, Serialize)]
pub struct FileMeta {
    /// The original filename of the uploaded part.
    #[serde(rename = "fileName", skip_serializing_if = "String::is_empty")]
    pub file_name: String,
    /// The fid assigned to the blob.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fid: String,
    /// `config.file_url_prefix + fid`.
    #[serde(rename = "fileUrl", skip_serializing_if = "String::is_empty")]
    pub file_url: String,
    /// Size of the uploaded blob in bytes, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Public URL of the backing volume server.
    #[serde(rename = "publicUrl", skip_serializing_if = "String::is_empty")]
    pub public_url: String,
    /// Replication count reported by the master.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Non-empty when this individual file failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The uniform response envelope returned by every proxy endpoint.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ApiResult {
    /// Successfully processed files, in input order. Empty on error.
    pub result: Vec<FileMeta>,
    /// A short human-readable outcome summary, e.g. `"ok"` or `"error"`.
    pub message: String,
    /// HTTP-coded outcome, plus the sentinel `1000` for "connection reset by client".
    pub status: u16,
    /// Present on error; carries the underlying reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When set, the response body is this verbatim payload rather than the JSON envelope
    /// above: a downloaded blob, or a `/health` summary document. Never serialized itself.
    #[serde(skip)]
    pub raw: Option<(bytes::Bytes, String)>,
    /// When set, the connection is dropped with an empty body rather than sending any envelope.
    #[serde(skip)]
    pub closed: bool,
}

impl ApiResult {
    /// Builds a success envelope.
    pub fn ok(result: Vec<FileMeta>) -> Self {
        ApiResult {
            result,
            message: "ok".to_string(),
            status: 200,
            detail: None,
            raw: None,
            closed: false,
        }
    }

    /// Builds an error envelope at the given status, e.g. 404, 406, 500, or the 1000 sentinel.
    pub fn error(status: u16, detail: impl Into<String>) -> Self {
        ApiResult {
            result: Vec::new(),
            message: "error".to_string(),
            status,
            detail: Some(detail.into()),
            raw: None,
            closed: false,
        }
    }

    /// Builds the download engine's not-found envelope. Unlike the generic error envelope,
    /// `message` carries the description directly rather than the literal `"error"`.
    pub fn not_found(path: &str) -> Self {
        ApiResult {
            result: Vec::new(),
            message: format!("File not found! {path}"),
            status: 404,
            detail: None,
            raw: None,
            closed: false,
        }
    }

    /// Builds the query engine's miss envelope: a distinct record shape (`fid`/`path`/`error`)
    /// rather than the generic `result`/`message`/`detail` shape, since a path<->fid miss has
    /// no file list to report.
    pub fn query_miss(status: u16, fid: &str, path: &str, error: &str) -> Self {
        let body = serde_json::json!({
            "status": status,
            "fid": fid,
            "path": path,
            "error": error,
        });
        ApiResult::error(status, error).with_raw(body)
    }

    /// The sentinel envelope emitted when the client resets the connection mid-write.
    pub fn connection_reset() -> Self {
        ApiResult {
            result: Vec::new(),
            message: "Closed by client!".to_string(),
            status: 1000,
            detail: None,
            raw: None,
            closed: false,
        }
    }

    /// The envelope for a denied request that is logged but answered by dropping the
    /// connection with no body, rather than a JSON 406.
    pub fn denied_silently() -> Self {
        ApiResult {
            result: Vec::new(),
            message: "denied".to_string(),
            status: 406,
            detail: None,
            raw: None,
            closed: true,
        }
    }

    /// The HTTP status code to send: `status` verbatim, except the 1000 sentinel maps to 500.
    pub fn http_status(&self) -> u16 {
        if self.status == 1000 {
            500
        } else {
            self.status
        }
    }

    /// Attaches a raw response body (a downloaded blob) in place of the JSON envelope.
    pub fn with_blob(mut self, bytes: bytes::Bytes, content_type: String) -> Self {
        self.raw = Some((bytes, content_type));
        self
    }

    /// Attaches a raw JSON document in place of the default envelope shape, for endpoints
    /// like `/health` that don't return a file list.
    pub fn with_raw(mut self, value: serde_json::Value) -> Self {
        let bytes = serde_json::to_vec(&value).unwrap_or_default();
        self.raw = Some((bytes::Bytes::from(bytes), "application/json".to_string()));
        self
    }

    /// Overrides the envelope's message, used by `/echo`.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// The raw body to send, if one was attached via [`with_blob`](Self::with_blob) or
    /// [`with_raw`](Self::with_raw).
    pub fn raw_body(&self) -> Option<(bytes::Bytes, String)> {
        self.raw.clone()
    }
}
