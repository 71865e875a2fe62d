//! Error types for the GCP provider

use bridge_traits::error::{BridgeError, VendorError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    /// Google API error document (`{"error": {...}}`)
    #[error("GCP API error (status {status}, reason {reason}): {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    /// Zonal kinds are listed one zone at a time
    #[error("{0} listing requires a zone in the sync scope")]
    MissingZone(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, GcpError>;

const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

impl From<GcpError> for VendorError {
    fn from(error: GcpError) -> Self {
        match error {
            GcpError::Api {
                status,
                reason,
                message,
            } => {
                if status == 429 || RATE_LIMIT_REASONS.contains(&reason.as_str()) {
                    VendorError::Throttled {
                        message,
                        retry_after: None,
                    }
                } else if status == 401 || status == 403 {
                    VendorError::Unauthorized(message)
                } else {
                    let code = if reason.is_empty() {
                        status.to_string()
                    } else {
                        reason
                    };
                    VendorError::Api { code, message }
                }
            }
            GcpError::Parse(msg) => VendorError::Parse(msg),
            GcpError::MissingZone(kind) => {
                VendorError::InvalidScope(format!("{} listing requires a zone", kind))
            }
            GcpError::NotFound(what) => VendorError::Api {
                code: "notFound".to_string(),
                message: what,
            },
            GcpError::Bridge(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, reason: &str) -> GcpError {
        GcpError::Api {
            status,
            reason: reason.to_string(),
            message: "m".to_string(),
        }
    }

    #[test]
    fn test_quota_403_is_throttled_not_unauthorized() {
        assert!(VendorError::from(api(403, "rateLimitExceeded")).is_transient());
        assert!(matches!(
            VendorError::from(api(403, "forbidden")),
            VendorError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_reason_becomes_code() {
        assert_eq!(
            VendorError::from(api(400, "invalid")),
            VendorError::Api {
                code: "invalid".into(),
                message: "m".into()
            }
        );
        assert!(matches!(
            VendorError::from(GcpError::MissingZone("cvm".into())),
            VendorError::InvalidScope(_)
        ));
    }
}
