use derive_more::Display;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error returned by [`crate::DirectoryAdapter`] implementations.
///
/// Implementations should choose the [`DirErrorKind`] carefully since the proxy maps it
/// directly onto the `status`/`detail` of the response envelope.
#[derive(Debug, Error)]
#[error("directory adapter error: {kind}")]
pub struct DirError {
    kind: DirErrorKind,
    #[source]
    source: Option<BoxError>,
}

impl DirError {
    /// Creates a new directory adapter error wrapping an underlying cause.
    pub fn new<E>(kind: DirErrorKind, error: E) -> DirError
    where
        E: Into<BoxError>,
    {
        DirError {
            kind,
            source: Some(error.into()),
        }
    }

    /// The kind of failure that occurred.
    pub fn kind(&self) -> DirErrorKind {
        self.kind
    }
}

impl From<DirErrorKind> for DirError {
    fn from(kind: DirErrorKind) -> DirError {
        DirError { kind, source: None }
    }
}

/// Coarse classification of [`DirError`] causes.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Display)]
pub enum DirErrorKind {
    /// The requested path or fid has no binding.
    #[display("not found")]
    NotFound,
    /// The underlying store (connection pool, cluster client) failed.
    #[display("backend unavailable")]
    BackendUnavailable,
    /// A malformed key, path, or TTL value was supplied.
    #[display("invalid input")]
    InvalidInput,
}
