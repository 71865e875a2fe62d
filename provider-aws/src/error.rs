use bridge_traits::error::{BridgeError, VendorError};
use thiserror::Error;

/// AWS provider errors
#[derive(Error, Debug)]
pub enum AwsError {
    /// `<Response><Errors><Error>` body of a failed call
    #[error("AWS API error {code}: {message} (request {request_id})")]
    Api {
        code: String,
        message: String,
        request_id: String,
    },

    #[error("AWS HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, AwsError>;

const UNAUTHORIZED_CODES: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "InvalidClientTokenId",
    "SignatureDoesNotMatch",
];

const THROTTLING_CODES: &[&str] = &["RequestLimitExceeded", "Throttling", "ThrottlingException"];

impl From<AwsError> for VendorError {
    fn from(error: AwsError) -> Self {
        match error {
            AwsError::Api { code, message, .. } => {
                if UNAUTHORIZED_CODES.contains(&code.as_str()) {
                    VendorError::Unauthorized(format!("{}: {}", code, message))
                } else if THROTTLING_CODES.contains(&code.as_str()) {
                    VendorError::Throttled {
                        message: format!("{}: {}", code, message),
                        retry_after: None,
                    }
                } else {
                    VendorError::Api { code, message }
                }
            }
            AwsError::Http { status, body } => match status {
                401 | 403 => VendorError::Unauthorized(body),
                429 | 503 => VendorError::Throttled {
                    message: body,
                    retry_after: None,
                },
                _ => VendorError::Api {
                    code: status.to_string(),
                    message: body,
                },
            },
            AwsError::Parse(msg) => VendorError::Parse(msg),
            AwsError::Signing(msg) => VendorError::Transport(msg),
            AwsError::Bridge(err) => err.into(),
        }
    }
}
