use std::time::Duration;

use bridge_traits::error::{BridgeError, VendorError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    /// ARM error document (`{"error": {"code", "message"}}`)
    #[error("Azure API error (status {status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Azure scopes require a resource group")]
    MissingResourceGroup,

    /// The NIC has no ip configuration to bind to
    #[error("Network interface {0} has no ip configuration")]
    NoIpConfiguration(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, AzureError>;

impl From<AzureError> for VendorError {
    fn from(error: AzureError) -> Self {
        match error {
            AzureError::Api {
                status,
                code,
                message,
                retry_after,
            } => match status {
                401 | 403 => VendorError::Unauthorized(format!("{}: {}", code, message)),
                429 => VendorError::Throttled {
                    message: format!("{}: {}", code, message),
                    retry_after,
                },
                _ => VendorError::Api { code, message },
            },
            AzureError::Parse(msg) => VendorError::Parse(msg),
            AzureError::MissingResourceGroup => {
                VendorError::InvalidScope("azure scopes require a resource_group".to_string())
            }
            AzureError::NoIpConfiguration(nic) => VendorError::Api {
                code: "NoIpConfiguration".to_string(),
                message: format!("network interface {} has no ip configuration", nic),
            },
            AzureError::Bridge(err) => err.into(),
        }
    }
}
