//! Error taxonomy (spec §4.6, §7).
//!
//! Every subsystem crate defines its own `thiserror` error enum at its own
//! boundary (the teacher's `infra::database::quotes::Error` pattern); this
//! module is the taxonomy those errors get folded into once they reach an
//! edge that has to answer with an HTTP-style status.

use std::fmt;

/// The seven response-level buckets from §4.6. Kept deliberately small and
/// flat — subsystem errors map down into one of these, they don't subclass
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    ServiceUnavailable,
    Internal,
}

impl ErrorKind {
    /// HTTP status code a transport adapter would use; informative only,
    /// this core never depends on an HTTP crate to produce it.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::Internal => 500,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A taxonomy-tagged error with a caller-facing message. Infrastructure
/// errors (KV/SQL) are wrapped with `ErrorKind::Internal` and their detail is
/// logged, not echoed back (§7: "logged with context, not echoed verbatim").
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    source: Option<anyhow::Error>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    /// Wraps an infrastructure failure (KV/SQL/etc). The source is kept for
    /// `tracing::error!` call sites but is never placed in `message`.
    pub fn internal(source: impl Into<anyhow::Error>) -> Self {
        let source = source.into();
        Self {
            kind: ErrorKind::Internal,
            message: "internal error".to_owned(),
            source: Some(source),
        }
    }

    pub fn source_detail(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::internal(err)
    }
}

impl From<redis::RedisError> for CoreError {
    fn from(err: redis::RedisError) -> Self {
        CoreError::internal(err)
    }
}
