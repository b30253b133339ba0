use axum::{
    Json,
    extract::{FromRef, FromRequestParts, State, rejection::JsonRejection},
    http::{header, request::Parts},
};

use democrm_api::service::{self, Identity};
use democrm_api::{AuthError, LoginRequest, LoginResponse, VerifyResponse};

use crate::AppConfig;
use crate::error::ApiErr;

// ---------------------------------------------------------------------------
// Auth extractor
// ---------------------------------------------------------------------------

/// Caller identity decoded from `Authorization: Bearer <token>`.
///
/// Taking this as a handler argument guards the handler: on any failure the
/// request is answered with 401 before the handler body runs.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub subject: String,
    pub expires_at: u64,
}

impl From<Identity> for AuthUser {
    fn from(id: Identity) -> Self {
        Self {
            subject: id.subject,
            expires_at: id.expires_at,
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        match service::authorize(header, &config.jwt_secret, service::now_unix()) {
            Ok(identity) => Ok(identity.into()),
            Err(e) => {
                match &e {
                    AuthError::MissingToken => {
                        tracing::debug!(path = %parts.uri.path(), "request without bearer token");
                    }
                    AuthError::InvalidOrExpiredToken(reason) => {
                        tracing::warn!(path = %parts.uri.path(), %reason, "rejected bearer token");
                    }
                }
                Err(e.into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// POST /api/login: exchange email + password for a bearer token.
pub async fn login(
    State(config): State<AppConfig>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiErr> {
    let Json(req) = payload.map_err(|e| ApiErr::bad_request(e.body_text()))?;

    let resp = service::issue_login(
        &config.account,
        &req.email,
        &req.password,
        &config.jwt_secret,
        service::now_unix(),
        config.token_ttl_secs,
    )
    .inspect_err(|e| tracing::info!(code = %e.code(), "login refused"))?;

    tracing::info!("login succeeded");
    Ok(Json(resp))
}

// ---------------------------------------------------------------------------
// Verify
// ---------------------------------------------------------------------------

/// GET /api/auth/verify: echo the identity carried by the caller's token.
pub async fn verify(user: AuthUser) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        subject: user.subject,
        expires_at: user.expires_at,
    })
}
