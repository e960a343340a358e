//! Verification keys and the sources they come from.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};

use crate::AuthError;

/// One public key usable for signature verification, addressed by `kid`.
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: String,
    pub alg: Algorithm,
    pub decoding_key: DecodingKey,
}

impl VerificationKey {
    pub fn new(kid: impl Into<String>, alg: Algorithm, decoding_key: DecodingKey) -> Self {
        Self {
            kid: kid.into(),
            alg,
            decoding_key,
        }
    }

    /// RS256 key from a PEM-encoded RSA public key (PKCS#1 or SPKI).
    pub fn rsa_pem(kid: impl Into<String>, pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(Self::new(kid, Algorithm::RS256, DecodingKey::from_rsa_pem(pem)?))
    }
}

impl core::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

/// Source of verification keys.
///
/// `find` returns `Ok(None)` when no key carries the identifier, and an error
/// only when the source itself could not be consulted.
#[async_trait]
pub trait KeySet: Send + Sync {
    async fn find(&self, kid: &str) -> Result<Option<VerificationKey>, AuthError>;
}

#[async_trait]
impl<K> KeySet for Arc<K>
where
    K: KeySet + ?Sized,
{
    async fn find(&self, kid: &str) -> Result<Option<VerificationKey>, AuthError> {
        (**self).find(kid).await
    }
}

/// Fixed set of keys (tests, offline development, pinned keys).
#[derive(Debug, Clone, Default)]
pub struct StaticKeySet {
    keys: Vec<VerificationKey>,
}

impl StaticKeySet {
    pub fn new(keys: Vec<VerificationKey>) -> Self {
        Self { keys }
    }

    pub fn single(key: VerificationKey) -> Self {
        Self { keys: vec![key] }
    }
}

#[async_trait]
impl KeySet for StaticKeySet {
    async fn find(&self, kid: &str) -> Result<Option<VerificationKey>, AuthError> {
        Ok(self.keys.iter().find(|k| k.kid == kid).cloned())
    }
}
