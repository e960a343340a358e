use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Verified token payload.
///
/// The payload is kept as the raw claim map so that whatever the identity
/// provider issued reaches handlers unchanged. Typed accessors cover the claims
/// this service actually reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new(claims: Map<String, Value>) -> Self {
        Self(claims)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Subject (`sub`) of the token, if present.
    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// The `permissions` claim as a list of strings.
    ///
    /// Returns `None` when the claim is absent or is not a list; non-string
    /// entries are skipped.
    pub fn permissions(&self) -> Option<Vec<&str>> {
        let list = self.get("permissions")?.as_array()?;
        Some(list.iter().filter_map(Value::as_str).collect())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Authentication / authorization failure.
///
/// Each variant carries a stable machine-readable [`code`](AuthError::code);
/// HTTP status mapping is left to the transport layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization header is expected")]
    HeaderMissing,

    #[error("{0}")]
    InvalidHeader(String),

    #[error("token expired")]
    TokenExpired,

    #[error("{0}")]
    InvalidClaims(String),

    /// Valid token, but the required permission was not granted.
    #[error("permission not found: {0}")]
    Unauthorized(String),

    #[error("verification keys unavailable: {0}")]
    KeySetUnavailable(String),
}

impl AuthError {
    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Self::InvalidHeader(msg.into())
    }

    pub fn invalid_claims(msg: impl Into<String>) -> Self {
        Self::InvalidClaims(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::HeaderMissing => "authorization_header_missing",
            AuthError::InvalidHeader(_) => "invalid_header",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidClaims(_) => "invalid_claims",
            AuthError::Unauthorized(_) => "unauthorized",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
        }
    }
}
