//! Shared business logic as framework-agnostic pure functions.
//!
//! The Axum server calls these with an explicit clock value, keeping route
//! handlers as thin adapters and the auth decision testable without HTTP.

use std::time::{SystemTime, UNIX_EPOCH};

use democrm_core::validate::{find_duplicate, validate_record};

use crate::crypto;
use crate::{AuthError, LoginError, LoginResponse, Record, ServiceError};

/// Seconds since the unix epoch.
pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ─── Auth ───────────────────────────────────────────────────────────────────

/// The caller a verified token speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    /// Unix seconds.
    pub expires_at: u64,
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// An absent header, another scheme, or an empty token all count as
/// "no credential presented".
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Decide whether a request may proceed. Stateless: the outcome depends only
/// on the header, the secret and `now_unix`.
pub fn authorize(header: Option<&str>, secret: &str, now_unix: u64) -> Result<Identity, AuthError> {
    let token = bearer_token(header)?;
    let claims =
        crypto::verify_token(token, secret, now_unix).map_err(AuthError::InvalidOrExpiredToken)?;
    Ok(Identity {
        subject: claims.sub,
        expires_at: claims.exp,
    })
}

/// The single configured account.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    pub email: String,
    pub password: String,
}

/// Check submitted credentials. Email matching ignores case and surrounding
/// whitespace; the password must match exactly.
pub fn check_login(
    account: &AccountCredentials,
    email: &str,
    password: &str,
) -> Result<String, LoginError> {
    let email = email.trim().to_lowercase();
    if email != account.email.trim().to_lowercase() {
        return Err(LoginError::EmailNotFound);
    }
    if password != account.password {
        return Err(LoginError::IncorrectPassword);
    }
    Ok(email)
}

/// Check credentials and mint a token on success.
pub fn issue_login(
    account: &AccountCredentials,
    email: &str,
    password: &str,
    secret: &str,
    now_unix: u64,
    ttl_secs: u64,
) -> Result<LoginResponse, ServiceError> {
    let subject = check_login(account, email, password)?;
    Ok(LoginResponse {
        token: crypto::sign_token(&subject, secret, now_unix, ttl_secs),
        expires_in: ttl_secs,
    })
}

// ─── Records ────────────────────────────────────────────────────────────────

/// Normalize and validate a submitted record. Returns the record as it should
/// be stored.
pub fn prepare_record(mut record: Record) -> Result<Record, ServiceError> {
    record.name = record.name.trim().to_string();
    record.email = record.email.trim().to_string();
    record.phone = record.phone.trim().to_string();
    validate_record(&record).map_err(ServiceError::Validation)?;
    Ok(record)
}

/// Reject `candidate` if another record already holds its email or phone.
pub fn ensure_unique(existing: &[Record], candidate: &Record) -> Result<(), ServiceError> {
    match find_duplicate(existing, candidate) {
        Some(dup) => Err(ServiceError::Duplicate(dup)),
        None => Ok(()),
    }
}
