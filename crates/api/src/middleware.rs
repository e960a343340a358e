//! Request middleware: the permission gate, per-request tracing context, and
//! the 405 envelope.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::{ALLOW, AUTHORIZATION}},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use canopy_auth::{AuthError, Claims, Permission, TokenVerifier, authorize, parse_bearer};
use canopy_observability::{RequestId, request_span};

use crate::app::errors::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AuthState {
    pub verifier: TokenVerifier,
}

/// State of one gated route: the verifier plus the permission it demands.
#[derive(Clone)]
pub struct GateState {
    pub auth: AuthState,
    pub required: Permission,
}

/// Reject the request unless it carries a valid token granting
/// `gate.required`; otherwise hand the verified [`Claims`] to the handler.
pub async fn permission_gate(State(gate): State<GateState>, mut req: Request, next: Next) -> Response {
    let authorization = req.headers().get(AUTHORIZATION).cloned();
    let claims = match authenticate(&gate, authorization.as_ref()).await {
        Ok(claims) => claims,
        Err(err) => {
            tracing::warn!(code = err.code(), permission = %gate.required, "request rejected: {err}");
            return ApiError::from(err).into_response();
        }
    };

    req.extensions_mut().insert(claims);
    next.run(req).await
}

async fn authenticate(gate: &GateState, authorization: Option<&HeaderValue>) -> Result<Claims, AuthError> {
    let header = authorization
        .map(|value| value.to_str())
        .transpose()
        .map_err(|_| AuthError::invalid_header("authorization header is not valid ASCII"))?;

    let token = parse_bearer(header)?;
    let claims = gate.auth.verifier.verify(token).await?;
    authorize(&claims, &gate.required)?;
    Ok(claims)
}

/// Wrap every request in a span carrying its request id, and echo the id back.
pub async fn request_context(req: Request, next: Next) -> Response {
    let request_id = RequestId::from_header(
        req.headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok()),
    );
    let span = request_span(request_id, req.method().as_str(), req.uri().path());

    let mut res = next.run(req).instrument(span.clone()).await;
    span.in_scope(|| tracing::info!(status = res.status().as_u16(), "request completed"));

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Give axum's bare 405 the JSON error envelope, keeping its `Allow` header.
pub async fn method_not_allowed(res: Response) -> Response {
    if res.status() != StatusCode::METHOD_NOT_ALLOWED {
        return res;
    }
    let allow = res.headers().get(ALLOW).cloned();
    let mut enveloped = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = allow {
        enveloped.headers_mut().insert(ALLOW, allow);
    }
    enveloped
}
