//! `canopy-auth`: bearer token verification and permission checks.
//!
//! This crate is intentionally decoupled from HTTP routing and storage. It knows
//! how to turn an `Authorization` header into verified [`Claims`], and how to
//! check those claims for a required [`Permission`].

pub mod authorize;
pub mod claims;
pub mod jwks;
pub mod keys;
pub mod permissions;
pub mod verifier;

pub use authorize::authorize;
pub use claims::{AuthError, Claims};
pub use jwks::{Jwk, Jwks, RemoteJwks};
pub use keys::{KeySet, StaticKeySet, VerificationKey};
pub use permissions::Permission;
pub use verifier::{TokenVerifier, parse_bearer};
