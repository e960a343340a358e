use axum::{Json, response::IntoResponse};
use serde_json::json;

use crate::app::errors::ApiError;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "success": true }))
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
