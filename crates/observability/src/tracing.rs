//! Tracing/logging initialization and per-request spans.

use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Initialize tracing/logging for the process.
///
/// JSON logs by default; `LOG_FORMAT=pretty` switches to human-readable output
/// for local work. Filtering follows `RUST_LOG` (default `info`).
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if pretty_requested(std::env::var("LOG_FORMAT").ok().as_deref()) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init();
    }
}

/// `LOG_FORMAT` value selecting human-readable output; JSON otherwise.
fn pretty_requested(log_format: Option<&str>) -> bool {
    log_format.is_some_and(|v| v.trim().eq_ignore_ascii_case("pretty"))
}

/// Correlation id attached to every request span (UUIDv7, time-ordered).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Accept a caller-supplied id if it is a UUID, otherwise mint one.
    pub fn from_header(value: Option<&str>) -> Self {
        value
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(Self)
            .unwrap_or_default()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Span covering one HTTP request.
pub fn request_span(request_id: RequestId, method: &str, path: &str) -> tracing::Span {
    tracing::info_span!("request", request_id = %request_id, method = %method, path = %path)
}
