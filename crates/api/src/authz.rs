//! Route-level authorization.
//!
//! Mutating routes are wrapped at registration time, so a handler never runs
//! for a request that lacks the route's permission. Reads stay public.

use axum::routing::MethodRouter;

use canopy_auth::Permission;

use crate::middleware::{AuthState, GateState, permission_gate};

/// Put `route` behind the permission gate for `permission`.
pub fn require_permission(route: MethodRouter, auth: &AuthState, permission: &'static str) -> MethodRouter {
    let gate = GateState {
        auth: auth.clone(),
        required: Permission::new(permission),
    };
    route.route_layer(axum::middleware::from_fn_with_state(gate, permission_gate))
}
