use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced by vendor resource clients.
///
/// Variants are returned to the sync engine unmodified; the engine never
/// retries them internally. Each provider crate converts its own error type
/// into this one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VendorError {
    #[error("Vendor rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Vendor throttled the request: {message}")]
    Throttled {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Vendor call timed out: {0}")]
    Timeout(String),

    #[error("Vendor API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Malformed vendor response: {0}")]
    Parse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid sync scope: {0}")]
    InvalidScope(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl VendorError {
    /// Whether a later invocation by the caller may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VendorError::Throttled { .. } | VendorError::Timeout(_) | VendorError::Transport(_)
        )
    }
}

impl From<BridgeError> for VendorError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(msg) => VendorError::Timeout(msg),
            BridgeError::Codec(msg) => VendorError::Parse(msg),
            other => VendorError::Transport(other.to_string()),
        }
    }
}
