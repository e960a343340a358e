//! Bearer token verification.
//!
//! Verification runs in a fixed order and stops at the first failure:
//!
//! 1. the token header decodes and names a `kid`,
//! 2. the key set holds a key for that `kid`,
//! 3. the signature verifies and `exp`, `aud` and `iss` check out.
//!
//! Parsing the `Authorization` header itself is [`parse_bearer`].

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};

use crate::keys::KeySet;
use crate::{AuthError, Claims};

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn parse_bearer(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::HeaderMissing)?;
    let mut parts = header.split_whitespace();

    let scheme = parts
        .next()
        .ok_or_else(|| AuthError::invalid_header("authorization header must not be empty"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::invalid_header(
            "authorization header must start with \"Bearer\"",
        ));
    }

    let token = parts
        .next()
        .ok_or_else(|| AuthError::invalid_header("token not found"))?;
    if parts.next().is_some() {
        return Err(AuthError::invalid_header(
            "authorization header must be a bearer token",
        ));
    }
    Ok(token)
}

/// Verifies tokens issued by one issuer for one audience.
#[derive(Clone)]
pub struct TokenVerifier {
    issuer: String,
    audience: String,
    leeway: u64,
    keys: Arc<dyn KeySet>,
}

impl TokenVerifier {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, keys: Arc<dyn KeySet>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway: 0,
            keys,
        }
    }

    /// Clock skew tolerated on `exp`/`nbf`, in seconds.
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header = decode_header(token)
            .map_err(|_| AuthError::invalid_header("unable to parse authentication token"))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_header("authorization malformed: missing kid"))?;

        let key = self
            .keys
            .find(&kid)
            .await?
            .ok_or_else(|| AuthError::invalid_header("unable to find the appropriate key"))?;

        let mut validation = Validation::new(key.alg);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);
        validation.leeway = self.leeway;

        let data = decode::<Claims>(token, &key.decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => AuthError::invalid_claims(
                "incorrect claims, please check the audience and issuer",
            ),
            _ => AuthError::invalid_header("unable to parse authentication token"),
        })?;

        Ok(data.claims)
    }
}
