//! Error types for the sync layer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error (connection refused/reset, DNS failure).
    #[error("network error: {0}")]
    Network(String),

    /// Timeout.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The vault asked us to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The vault is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Vault, record or field not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authenticated but not allowed.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed request or reference.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A remote failure that carries no structured classification.
    #[error("remote error: {0}")]
    Remote(String),

    /// Local I/O error.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Local env file could not be parsed.
    #[error("parse error in {} line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A failure annotated with the step that produced it.
    #[error("{operation} failed: {source}")]
    Operation {
        operation: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl From<vaultsync_types::Error> for SyncError {
    fn from(err: vaultsync_types::Error) -> Self {
        SyncError::InvalidInput(err.to_string())
    }
}

/// How a failure should be treated by the retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying: network, timeout, rate limiting, unavailability.
    Transient,
    /// Retrying cannot help: auth, not found, permission, malformed input,
    /// and anything unrecognised.
    Permanent,
    /// Local failure (filesystem, parsing, configuration).
    Local,
}

const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "dns",
    "could not resolve",
    "reset by peer",
    "rate limit",
    "too many requests",
    "429",
    "service unavailable",
    "503",
    "temporarily unavailable",
];

const PERMANENT_MARKERS: &[&str] = &[
    "unauthorized",
    "not signed in",
    "authentication",
    "forbidden",
    "permission",
    "not found",
    "isn't an item",
    "invalid",
    "malformed",
];

/// Classifies a free-form error message from a remote tool.
///
/// Permanent markers win over transient ones; a message matching neither
/// is permanent.
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_ascii_lowercase();
    if PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorClass::Permanent;
    }
    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        return ErrorClass::Transient;
    }
    ErrorClass::Permanent
}

impl SyncError {
    /// Wraps this error with the label of the operation that produced it.
    pub fn in_operation(self, operation: impl Into<String>) -> Self {
        SyncError::Operation {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// Builds an I/O error carrying the failing path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Classifies the error for retry purposes.
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Network(_)
            | SyncError::Timeout(_)
            | SyncError::RateLimited(_)
            | SyncError::Unavailable(_) => ErrorClass::Transient,
            SyncError::Auth(_)
            | SyncError::NotFound(_)
            | SyncError::PermissionDenied(_)
            | SyncError::InvalidInput(_) => ErrorClass::Permanent,
            SyncError::Remote(message) => classify_message(message),
            SyncError::Io { .. }
            | SyncError::Parse { .. }
            | SyncError::Config(_)
            | SyncError::Serialization(_) => ErrorClass::Local,
            SyncError::Operation { source, .. } => source.class(),
        }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Process exit status for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        2
    }
}
