use thiserror::Error;

use democrm_api::{DuplicateField, ErrorCode, FieldError};

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure: no HTTP response was received.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(#[from] reqwest::Error),

    /// The server answered with an error body.
    #[error("HTTP {status} ({code}): {message}")]
    Api {
        status: u16,
        code: ErrorCode,
        message: String,
        fields: Vec<FieldError>,
        duplicate: Option<DuplicateField>,
    },

    #[error("auth token not set")]
    NotAuthenticated,

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// The server refused the bearer token. The session is over and the
    /// user has to sign in again.
    pub fn is_token_rejected(&self) -> bool {
        matches!(self, Self::Api { status: 401, code, .. } if code.is_auth_failure())
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}
