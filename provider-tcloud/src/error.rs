//! Error types for the TencentCloud provider

use std::time::Duration;

use bridge_traits::error::{BridgeError, VendorError};
use thiserror::Error;

/// TencentCloud provider errors
#[derive(Error, Debug)]
pub enum TCloudError {
    /// API 3.0 error envelope (`Response.Error`)
    #[error("TencentCloud API error {code}: {message} (request {request_id})")]
    Api {
        code: String,
        message: String,
        request_id: String,
    },

    /// Non-2xx status without a parsable envelope
    #[error("TencentCloud HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    Parse(String),

    /// Offset cursor that is not a number
    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type for TencentCloud operations
pub type Result<T> = std::result::Result<T, TCloudError>;

impl From<TCloudError> for VendorError {
    fn from(error: TCloudError) -> Self {
        match error {
            TCloudError::Api { code, message, .. } => {
                if code.starts_with("AuthFailure") || code == "UnauthorizedOperation" {
                    VendorError::Unauthorized(format!("{}: {}", code, message))
                } else if code.starts_with("RequestLimitExceeded") {
                    VendorError::Throttled {
                        message: format!("{}: {}", code, message),
                        retry_after: Some(Duration::from_secs(1)),
                    }
                } else {
                    VendorError::Api { code, message }
                }
            }
            TCloudError::Http { status, body } => match status {
                401 | 403 => VendorError::Unauthorized(body),
                429 => VendorError::Throttled {
                    message: body,
                    retry_after: None,
                },
                _ => VendorError::Api {
                    code: status.to_string(),
                    message: body,
                },
            },
            TCloudError::Parse(msg) => VendorError::Parse(msg),
            TCloudError::InvalidPageToken(token) => {
                VendorError::InvalidScope(format!("invalid offset token '{}'", token))
            }
            TCloudError::Signing(msg) => VendorError::Transport(msg),
            TCloudError::Bridge(err) => err.into(),
        }
    }
}
