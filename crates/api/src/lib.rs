//! Shared API types, token crypto and auth service functions for democrm.
//!
//! This crate is the single source of truth for request/response shapes and
//! error codes. The axum server and the typed client both import from here.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "backend")]
pub mod crypto;
#[cfg(feature = "backend")]
pub mod service;

pub use democrm_core::{
    DuplicateField, Field, FieldError, Industry, PageRequest, PageResult, QueryError, Record,
    Status,
};

/// Response header carrying the post-filter match count of a listing.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Default bearer-token lifetime: 30 minutes.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 30 * 60;

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Email + password login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned by `POST /api/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    /// Seconds until the token stops verifying.
    pub expires_in: u64,
}

/// Returned by `GET /api/auth/verify`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub subject: String,
    /// Unix seconds.
    pub expires_at: u64,
}

// ─── Clients ─────────────────────────────────────────────────────────────────

/// Query string of `GET /api/clients`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientListQuery {
    #[serde(rename = "_page", default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(rename = "_limit", default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
}

impl ClientListQuery {
    /// Apply the list-view defaults (page 1, 10 per page).
    pub fn to_page_request(&self) -> Result<PageRequest, QueryError> {
        PageRequest::new(
            self.page.unwrap_or(1),
            self.limit
                .unwrap_or(democrm_core::query::DEFAULT_PAGE_SIZE),
            self.q.clone(),
        )
    }
}

impl From<&PageRequest> for ClientListQuery {
    fn from(req: &PageRequest) -> Self {
        Self {
            page: Some(req.cursor()),
            limit: Some(req.page_size()),
            q: req.filter().map(str::to_string),
        }
    }
}

// ─── Misc ────────────────────────────────────────────────────────────────────

/// Generic success response for operations that don't return data.
#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Machine-readable error code carried in every error body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingToken,
    InvalidOrExpiredToken,
    EmailNotFound,
    IncorrectPassword,
    ValidationFailed,
    DuplicateField,
    NotFound,
    BadRequest,
    Internal,
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidOrExpiredToken => "invalid_or_expired_token",
            Self::EmailNotFound => "email_not_found",
            Self::IncorrectPassword => "incorrect_password",
            Self::ValidationFailed => "validation_failed",
            Self::DuplicateField => "duplicate_field",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }

    /// Codes that mean "this credential is no good, sign in again".
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::MissingToken | Self::InvalidOrExpiredToken)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a presented token was refused. Logged server-side, never sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenRejection {
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("missing claim: {0}")]
    MissingClaim(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid or expired token")]
    InvalidOrExpiredToken(TokenRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LoginError {
    #[error("email not found")]
    EmailNotFound,
    #[error("incorrect password")]
    IncorrectPassword,
}

/// Framework-agnostic service error. Route handlers convert it into an HTTP
/// response; pure functions return it directly.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Login(#[from] LoginError),
    #[error("validation failed")]
    Validation(Vec<FieldError>),
    #[error(transparent)]
    Duplicate(#[from] DuplicateField),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// HTTP status code as a `u16`.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(_) | Self::Login(_) => 401,
            Self::Validation(_) => 422,
            Self::Duplicate(_) => 409,
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Internal(_) => 500,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Auth(AuthError::MissingToken) => ErrorCode::MissingToken,
            Self::Auth(AuthError::InvalidOrExpiredToken(_)) => ErrorCode::InvalidOrExpiredToken,
            Self::Login(LoginError::EmailNotFound) => ErrorCode::EmailNotFound,
            Self::Login(LoginError::IncorrectPassword) => ErrorCode::IncorrectPassword,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::Duplicate(_) => ErrorCode::DuplicateField,
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<QueryError> for ServiceError {
    fn from(e: QueryError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

/// JSON error body: `{"error": "<code>", "message": "..."}` plus details for
/// validation and duplicate failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorCode,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<DuplicateField>,
}

impl From<&ServiceError> for ApiError {
    fn from(e: &ServiceError) -> Self {
        // Internal details stay in the logs.
        let message = match e {
            ServiceError::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };
        Self {
            error: e.code(),
            message,
            fields: match e {
                ServiceError::Validation(fields) => fields.clone(),
                _ => Vec::new(),
            },
            duplicate: match e {
                ServiceError::Duplicate(dup) => Some(dup.clone()),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_401_with_distinct_codes() {
        let missing = ServiceError::from(AuthError::MissingToken);
        let expired = ServiceError::from(AuthError::InvalidOrExpiredToken(TokenRejection::Expired));
        assert_eq!(missing.status_code(), 401);
        assert_eq!(expired.status_code(), 401);
        assert_eq!(missing.code(), ErrorCode::MissingToken);
        assert_eq!(expired.code(), ErrorCode::InvalidOrExpiredToken);
    }

    #[test]
    fn error_body_never_carries_the_rejection_reason() {
        let err = ServiceError::from(AuthError::InvalidOrExpiredToken(TokenRejection::BadSignature));
        let body = serde_json::to_value(ApiError::from(&err)).unwrap();
        assert_eq!(body["error"], "invalid_or_expired_token");
        assert!(!body.to_string().contains("signature"));
    }

    #[test]
    fn internal_message_is_redacted() {
        let err = ServiceError::Internal("reading /srv/db.json: permission denied".into());
        let body = ApiError::from(&err);
        assert_eq!(body.message, "internal server error");
    }

    #[test]
    fn unknown_codes_decode_as_unknown() {
        let body: ApiError =
            serde_json::from_str(r#"{"error":"rate_limited","message":"slow down"}"#).unwrap();
        assert_eq!(body.error, ErrorCode::Unknown);
    }

    #[test]
    fn list_query_defaults_to_first_page_of_ten() {
        let req = ClientListQuery::default().to_page_request().unwrap();
        assert_eq!(req.cursor(), 1);
        assert_eq!(req.page_size(), 10);
        assert_eq!(req.filter(), None);
    }

    #[test]
    fn list_query_rejects_page_zero() {
        let q = ClientListQuery {
            page: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            q.to_page_request().map_err(ServiceError::from),
            Err(ServiceError::BadRequest(_))
        ));
    }
}
