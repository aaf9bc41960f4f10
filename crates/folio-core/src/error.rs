//! Shared error type across folio crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed request.
    BadRequest,
    /// Resource does not exist.
    NotFound,
    /// Rejected by the origin policy.
    NotAllowed,
    /// Invalid configuration.
    Config,
    /// Listener could not be bound.
    Bind,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::NotFound => "NOT_FOUND",
            ClientCode::NotAllowed => "NOT_ALLOWED",
            ClientCode::Config => "CONFIG",
            ClientCode::Bind => "BIND",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, FolioError>;

/// Unified error type used by core and server.
#[derive(Debug, Error)]
pub enum FolioError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not allowed: {0}")]
    NotAllowed(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("internal: {0}")]
    Internal(String),
}

impl FolioError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            FolioError::BadRequest(_) => ClientCode::BadRequest,
            FolioError::NotFound(_) => ClientCode::NotFound,
            FolioError::NotAllowed(_) => ClientCode::NotAllowed,
            FolioError::Config(_) => ClientCode::Config,
            FolioError::Bind { .. } => ClientCode::Bind,
            FolioError::Internal(_) => ClientCode::Internal,
        }
    }
}
