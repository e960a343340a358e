use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    routing::{delete, get, patch, post},
};
use serde_json::{Value, json};

use canopy_auth::{Claims, permissions::scopes};
use canopy_core::{FarmerId, NewFarmer, TallyScope};

use crate::app::dto::{self, CreateFarmerRequest, UpdateFarmerRequest};
use crate::app::errors::ApiError;
use crate::app::services::SharedStore;
use crate::authz::require_permission;
use crate::middleware::AuthState;

pub fn router(auth: &AuthState) -> Router {
    Router::new()
        .route(
            "/",
            get(list_farmers).merge(require_permission(post(create_farmer), auth, scopes::POST_FARMER)),
        )
        .route(
            "/:id",
            get(get_farmer)
                .merge(require_permission(patch(update_farmer), auth, scopes::PATCH_FARMER))
                .merge(require_permission(delete(delete_farmer), auth, scopes::DELETE_FARMER)),
        )
}

pub async fn list_farmers(Extension(store): Extension<SharedStore>) -> Result<Json<Value>, ApiError> {
    let farmers = store
        .list_farmers()
        .await
        .map_err(|e| ApiError::failed_read("farmers.list", e))?;

    Ok(Json(json!({
        "success": true,
        "number_of_farmers": farmers.len(),
        "farmers": farmers,
    })))
}

/// Farmer detail with their trees counted by species.
pub async fn get_farmer(
    Extension(store): Extension<SharedStore>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: FarmerId = dto::parse_id(&id)?;
    let farmer = store
        .get_farmer(id)
        .await
        .map_err(|e| ApiError::failed_read("farmers.get", e))?
        .ok_or(ApiError::NotFound)?;
    let tally = store
        .tree_tally(TallyScope::Farmer(id))
        .await
        .map_err(|e| ApiError::failed_read("farmers.tally", e))?;

    Ok(Json(json!({
        "success": true,
        "farmer": farmer,
        "trees": tally.by_species,
        "number_of_trees": tally.total,
    })))
}

pub async fn create_farmer(
    Extension(store): Extension<SharedStore>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateFarmerRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = dto::parse_body(body)?;
    let farmer = NewFarmer::new(body.name)?;

    let created = store
        .insert_farmer(farmer)
        .await
        .map_err(|e| ApiError::rejected_write("farmers.create", e))?;
    let total = store
        .count_farmers()
        .await
        .map_err(|e| ApiError::rejected_write("farmers.count", e))?;

    tracing::info!(farmer_id = %created.id, subject = claims.subject(), "farmer created");
    Ok(Json(json!({
        "success": true,
        "created": created,
        "total_farmers": total,
    })))
}

pub async fn update_farmer(
    Extension(store): Extension<SharedStore>,
    Path(id): Path<String>,
    body: Result<Json<UpdateFarmerRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id: FarmerId = dto::parse_id(&id)?;
    store
        .get_farmer(id)
        .await
        .map_err(|e| ApiError::rejected_write("farmers.get", e))?
        .ok_or(ApiError::NotFound)?;

    let name = NewFarmer::new(dto::parse_body(body)?.name)?.name;
    let modified = store
        .rename_farmer(id, name)
        .await
        .map_err(|e| ApiError::rejected_write("farmers.rename", e))?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(json!({
        "success": true,
        "modified": modified,
    })))
}

/// Delete a farmer together with every tree they planted.
pub async fn delete_farmer(
    Extension(store): Extension<SharedStore>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: FarmerId = dto::parse_id(&id)?;
    let deleted = store
        .delete_farmer(id)
        .await
        .map_err(|e| ApiError::rejected_write("farmers.delete", e))?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    let total = store
        .count_farmers()
        .await
        .map_err(|e| ApiError::rejected_write("farmers.count", e))?;

    Ok(Json(json!({
        "success": true,
        "deleted": id,
        "total_farmers": total,
    })))
}
