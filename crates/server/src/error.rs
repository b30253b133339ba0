use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use democrm_api::{ApiError, AuthError, QueryError, ServiceError};

/// Unified API error type.
///
/// Produces `{"error": "<code>", "message": "..."}` JSON responses. The body is
/// built from [`ServiceError`] so that codes stay identical to what the typed
/// client decodes.
#[derive(Debug)]
pub struct ApiErr(pub ServiceError);

impl ApiErr {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(ServiceError::BadRequest(msg.into()))
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(ServiceError::NotFound(msg.into()))
    }

    /// Build a closure that logs a storage/IO error and returns `500 Internal Server Error`.
    pub fn from_db<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| {
            tracing::error!("{context}: {e:#}");
            Self(ServiceError::Internal(context.to_string()))
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<ServiceError> for ApiErr {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl From<AuthError> for ApiErr {
    fn from(e: AuthError) -> Self {
        Self(e.into())
    }
}

impl From<QueryError> for ApiErr {
    fn from(e: QueryError) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        (self.status(), Json(ApiError::from(&self.0))).into_response()
    }
}
