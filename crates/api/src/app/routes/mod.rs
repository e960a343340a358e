use axum::{Router, routing::get};

use crate::middleware::AuthState;

pub mod farmers;
pub mod forests;
pub mod system;
pub mod trees;

/// Router for every resource. Reads are public; each mutating route carries
/// its own permission gate.
pub fn router(auth: &AuthState) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/farmers", farmers::router(auth))
        .nest("/forests", forests::router(auth))
        .nest("/trees", trees::router(auth))
}
