//! Error types for the HuaWei Cloud provider

use std::time::Duration;

use bridge_traits::error::{BridgeError, VendorError};
use thiserror::Error;

/// API gateway codes for a rejected signature or token.
const UNAUTHORIZED_CODES: &[&str] = &["APIGW.0301", "APIGW.0303", "APIGW.0101"];

/// API gateway flow-control codes.
const THROTTLING_CODES: &[&str] = &["APIGW.0308", "APIGW.0309"];

#[derive(Error, Debug)]
pub enum HuaWeiError {
    #[error("HuaWei API error (status {status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    /// Page-number cursor that is not a number
    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, HuaWeiError>;

impl From<HuaWeiError> for VendorError {
    fn from(error: HuaWeiError) -> Self {
        match error {
            HuaWeiError::Api {
                status,
                code,
                message,
            } => {
                if status == 401 || status == 403 || UNAUTHORIZED_CODES.contains(&code.as_str()) {
                    VendorError::Unauthorized(format!("{}: {}", code, message))
                } else if status == 429 || THROTTLING_CODES.contains(&code.as_str()) {
                    VendorError::Throttled {
                        message: format!("{}: {}", code, message),
                        retry_after: Some(Duration::from_secs(1)),
                    }
                } else {
                    VendorError::Api { code, message }
                }
            }
            HuaWeiError::Parse(msg) => VendorError::Parse(msg),
            HuaWeiError::InvalidPageToken(token) => {
                VendorError::InvalidScope(format!("invalid page token '{}'", token))
            }
            HuaWeiError::Signing(msg) => VendorError::Transport(msg),
            HuaWeiError::Bridge(err) => err.into(),
        }
    }
}
