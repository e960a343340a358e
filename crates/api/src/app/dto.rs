//! Request bodies and extraction helpers.
//!
//! Bodies are taken as `Result<Json<T>, JsonRejection>` so that malformed JSON
//! and missing fields surface as the 422 envelope instead of axum's plain-text
//! rejection.

use core::str::FromStr;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use serde::Deserialize;

use canopy_core::DomainError;

use crate::app::errors::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateFarmerRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFarmerRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateForestRequest {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateForestRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTreesRequest {
    pub name: String,
    pub farmer_id: i64,
    pub forest_id: i64,
    pub quantity: i64,
}

pub fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::unprocessable(rejection.body_text()))
}

/// Parse a path id; anything that is not an id cannot name a resource.
pub fn parse_id<I>(raw: &str) -> Result<I, ApiError>
where
    I: FromStr<Err = DomainError>,
{
    raw.parse::<I>().map_err(ApiError::from)
}
