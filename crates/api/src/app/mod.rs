//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store and token verifier construction from configuration
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request bodies and body/path parsing helpers
//! - `errors.rs`: the error envelope

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::middleware::{self, AuthState};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, SharedStore, build_services};

/// Build the full HTTP router (public entrypoint used by `main.rs` and tests).
pub fn build_app(services: AppServices) -> Router {
    let auth_state = AuthState {
        verifier: services.verifier,
    };

    routes::router(&auth_state)
        .fallback(routes::system::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::request_context))
                .layer(axum::middleware::map_response(middleware::method_not_allowed))
                .layer(Extension(services.store)),
        )
}
