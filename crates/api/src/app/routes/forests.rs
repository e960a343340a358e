use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    routing::{delete, get, patch, post},
};
use serde_json::{Value, json};

use canopy_auth::permissions::scopes;
use canopy_core::{ForestId, ForestPatch, NewForest, TallyScope};

use crate::app::dto::{self, CreateForestRequest, UpdateForestRequest};
use crate::app::errors::ApiError;
use crate::app::services::SharedStore;
use crate::authz::require_permission;
use crate::middleware::AuthState;

pub fn router(auth: &AuthState) -> Router {
    Router::new()
        .route(
            "/",
            get(list_forests).merge(require_permission(post(create_forest), auth, scopes::POST_FOREST)),
        )
        .route(
            "/:id",
            get(get_forest)
                .merge(require_permission(patch(update_forest), auth, scopes::PATCH_FOREST))
                .merge(require_permission(delete(delete_forest), auth, scopes::DELETE_FOREST)),
        )
}

pub async fn list_forests(Extension(store): Extension<SharedStore>) -> Result<Json<Value>, ApiError> {
    let forests = store
        .list_forests()
        .await
        .map_err(|e| ApiError::failed_read("forests.list", e))?;

    Ok(Json(json!({
        "success": true,
        "number_of_forests": forests.len(),
        "forests": forests,
    })))
}

/// Forest detail: trees by species plus how many distinct farmers planted there.
pub async fn get_forest(
    Extension(store): Extension<SharedStore>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: ForestId = dto::parse_id(&id)?;
    let forest = store
        .get_forest(id)
        .await
        .map_err(|e| ApiError::failed_read("forests.get", e))?
        .ok_or(ApiError::NotFound)?;
    let tally = store
        .tree_tally(TallyScope::Forest(id))
        .await
        .map_err(|e| ApiError::failed_read("forests.tally", e))?;

    Ok(Json(json!({
        "success": true,
        "forest": forest,
        "trees": tally.by_species,
        "number_of_trees": tally.total,
        "farmer_count": tally.farmer_count,
    })))
}

pub async fn create_forest(
    Extension(store): Extension<SharedStore>,
    body: Result<Json<CreateForestRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = dto::parse_body(body)?;
    let forest = NewForest::new(body.name, body.location)?;

    let created = store
        .insert_forest(forest)
        .await
        .map_err(|e| ApiError::rejected_write("forests.create", e))?;
    let forests = store
        .list_forests()
        .await
        .map_err(|e| ApiError::rejected_write("forests.list", e))?;

    tracing::info!(forest_id = %created.id, "forest created");
    Ok(Json(json!({
        "success": true,
        "created": created,
        "forests": forests,
    })))
}

pub async fn update_forest(
    Extension(store): Extension<SharedStore>,
    Path(id): Path<String>,
    body: Result<Json<UpdateForestRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id: ForestId = dto::parse_id(&id)?;
    store
        .get_forest(id)
        .await
        .map_err(|e| ApiError::rejected_write("forests.get", e))?
        .ok_or(ApiError::NotFound)?;

    let body = dto::parse_body(body)?;
    let patch = ForestPatch::new(body.name, body.location)?;
    let modified = store
        .update_forest(id, patch)
        .await
        .map_err(|e| ApiError::rejected_write("forests.update", e))?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(json!({
        "success": true,
        "modified": modified,
    })))
}

/// Delete a forest together with every tree planted in it.
pub async fn delete_forest(
    Extension(store): Extension<SharedStore>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: ForestId = dto::parse_id(&id)?;
    let deleted = store
        .delete_forest(id)
        .await
        .map_err(|e| ApiError::rejected_write("forests.delete", e))?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    let total = store
        .count_forests()
        .await
        .map_err(|e| ApiError::rejected_write("forests.count", e))?;

    Ok(Json(json!({
        "success": true,
        "deleted": id,
        "total_forests": total,
    })))
}
