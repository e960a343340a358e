use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use canopy_auth::AuthError;
use canopy_core::DomainError;
use canopy_infra::StoreError;

/// Error returned by handlers and the permission gate.
///
/// Every variant renders as the `{success: false, error, message}` envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("resource not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    /// Detail is logged, never sent to the client.
    #[error("unprocessable")]
    Unprocessable(String),

    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::Unprocessable(detail.into())
    }

    /// Store failure inside a mutating handler.
    pub fn rejected_write(operation: &'static str, err: StoreError) -> Self {
        tracing::error!(operation, error = %err, "store write failed");
        Self::Unprocessable(err.to_string())
    }

    /// Store failure inside a read handler.
    pub fn failed_read(operation: &'static str, err: StoreError) -> Self {
        tracing::error!(operation, error = %err, "store read failed");
        Self::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(err) => auth_status(err),
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => Self::Unprocessable(msg),
            DomainError::InvalidId(_) | DomainError::NotFound => Self::NotFound,
        }
    }
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::HeaderMissing
        | AuthError::InvalidHeader(_)
        | AuthError::TokenExpired
        | AuthError::InvalidClaims(_) => StatusCode::UNAUTHORIZED,
        AuthError::Unauthorized(_) => StatusCode::FORBIDDEN,
        AuthError::KeySetUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Auth(err) => json_error(status, Some(err.code()), err.to_string()),
            _ => json_error(status, None, self.to_string()),
        }
    }
}

pub fn json_error(status: StatusCode, code: Option<&'static str>, message: impl Into<String>) -> Response {
    let mut body = json!({
        "success": false,
        "error": status.as_u16(),
        "message": message.into(),
    });
    if let Some(code) = code {
        body["code"] = json!(code);
    }
    (status, axum::Json(body)).into_response()
}
