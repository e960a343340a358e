//! Issuer-published key sets (JWKS).
//!
//! The identity provider exposes its public signing keys at
//! `<issuer>/.well-known/jwks.json`. [`RemoteJwks`] fetches that document,
//! keeps the RSA signing keys for a TTL, and refetches when a token names a
//! `kid` it has not seen (key rotation).

use std::str::FromStr;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};

use crate::keys::{KeySet, VerificationKey};
use crate::AuthError;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_MIN_REFRESH: Duration = Duration::from_secs(10);
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(rename = "use", default)]
    pub use_field: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwk {
    /// Convert to a verification key.
    ///
    /// Returns `None` for entries this service cannot verify with: non-RSA
    /// keys, encryption keys, entries without a `kid`, or unknown algorithms.
    pub fn to_verification_key(&self) -> Option<VerificationKey> {
        if self.kty != "RSA" || self.use_field.as_deref().is_some_and(|u| u != "sig") {
            return None;
        }
        let kid = self.kid.as_ref()?;
        let alg = match self.alg.as_deref() {
            Some(alg) => Algorithm::from_str(alg).ok()?,
            None => Algorithm::RS256,
        };
        if !matches!(alg, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) {
            return None;
        }
        let decoding_key =
            DecodingKey::from_rsa_components(self.n.as_deref()?, self.e.as_deref()?).ok()?;
        Some(VerificationKey::new(kid.clone(), alg, decoding_key))
    }
}

impl Jwks {
    pub fn verification_keys(&self) -> Vec<VerificationKey> {
        self.keys.iter().filter_map(Jwk::to_verification_key).collect()
    }
}

struct CachedKeys {
    keys: Vec<VerificationKey>,
    fetched_at: Instant,
}

/// Key set fetched over HTTP from the issuer, cached with a TTL.
pub struct RemoteJwks {
    url: String,
    client: reqwest::Client,
    ttl: Duration,
    min_refresh: Duration,
    cache: RwLock<Option<CachedKeys>>,
    /// Serializes refetches so concurrent misses share one fetch.
    refresh_lock: Mutex<()>,
}

impl RemoteJwks {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            url: url.into(),
            client,
            ttl: DEFAULT_TTL,
            min_refresh: DEFAULT_MIN_REFRESH,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Key set published by `issuer` at its well-known location.
    pub fn for_issuer(issuer: &str) -> Self {
        Self::new(format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/')))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Minimum age of the cache before an unknown `kid` triggers a refetch.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the key set and replace the cache.
    pub async fn refresh(&self) -> Result<Vec<VerificationKey>, AuthError> {
        let jwks: Jwks = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| AuthError::KeySetUnavailable(format!("fetch {}: {e}", self.url)))?
            .json()
            .await
            .map_err(|e| AuthError::KeySetUnavailable(format!("decode {}: {e}", self.url)))?;

        let keys = jwks.verification_keys();
        tracing::debug!(url = %self.url, keys = keys.len(), "refreshed key set");

        if let Ok(mut cache) = self.cache.write() {
            *cache = Some(CachedKeys {
                keys: keys.clone(),
                fetched_at: Instant::now(),
            });
        }
        Ok(keys)
    }

    /// Cached lookup. The outer `Option` is `None` when the cache cannot
    /// answer and a fetch is warranted.
    fn cached(&self, kid: &str) -> Option<Option<VerificationKey>> {
        let cache = self.cache.read().ok()?;
        let cached = cache.as_ref()?;
        let age = cached.fetched_at.elapsed();
        if age >= self.ttl {
            return None;
        }
        match cached.keys.iter().find(|k| k.kid == kid) {
            Some(key) => Some(Some(key.clone())),
            None if age < self.min_refresh => Some(None),
            None => None,
        }
    }
}

#[async_trait]
impl KeySet for RemoteJwks {
    async fn find(&self, kid: &str) -> Result<Option<VerificationKey>, AuthError> {
        if let Some(hit) = self.cached(kid) {
            return Ok(hit);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(hit) = self.cached(kid) {
            return Ok(hit);
        }
        let keys = self.refresh().await?;
        Ok(keys.into_iter().find(|k| k.kid == kid))
    }
}
