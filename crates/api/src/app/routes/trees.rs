use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    routing::{delete, get, post},
};
use serde_json::{Value, json};

use canopy_auth::{Claims, permissions::scopes};
use canopy_core::{FarmerId, ForestId, NewTree, TreeId};
use canopy_infra::StoreError;

use crate::app::dto::{self, CreateTreesRequest};
use crate::app::errors::ApiError;
use crate::app::services::SharedStore;
use crate::authz::require_permission;
use crate::middleware::AuthState;

pub fn router(auth: &AuthState) -> Router {
    Router::new()
        .route(
            "/",
            get(list_trees).merge(require_permission(post(create_trees), auth, scopes::POST_TREE)),
        )
        .route(
            "/:id",
            require_permission(delete(delete_tree), auth, scopes::DELETE_TREE),
        )
}

pub async fn list_trees(Extension(store): Extension<SharedStore>) -> Result<Json<Value>, ApiError> {
    let trees = store
        .list_trees()
        .await
        .map_err(|e| ApiError::failed_read("trees.list", e))?;

    Ok(Json(json!({
        "success": true,
        "number_of_trees": trees.len(),
        "trees": trees,
    })))
}

/// Plant `quantity` identical trees for one farmer in one forest.
///
/// Both owners must exist; the batch is stored all-or-nothing.
pub async fn create_trees(
    Extension(store): Extension<SharedStore>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<CreateTreesRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let body = dto::parse_body(body)?;
    let quantity = NewTree::check_quantity(body.quantity)?;
    let tree = NewTree::new(body.name, FarmerId::new(body.farmer_id), ForestId::new(body.forest_id))?;

    let farmer = store
        .get_farmer(tree.farmer_id)
        .await
        .map_err(|e| ApiError::rejected_write("trees.farmer", e))?;
    let forest = store
        .get_forest(tree.forest_id)
        .await
        .map_err(|e| ApiError::rejected_write("trees.forest", e))?;
    if farmer.is_none() || forest.is_none() {
        return Err(ApiError::NotFound);
    }

    let created = store.insert_trees(tree, quantity).await.map_err(|e| match e {
        // Owner deleted between the check and the insert.
        StoreError::MissingReference(_) => ApiError::NotFound,
        other => ApiError::rejected_write("trees.create", other),
    })?;
    let total = store
        .count_trees()
        .await
        .map_err(|e| ApiError::rejected_write("trees.count", e))?;

    tracing::info!(planted = created.len(), subject = claims.subject(), "trees planted");
    Ok(Json(json!({
        "success": true,
        "created": created,
        "total_trees": total,
    })))
}

pub async fn delete_tree(
    Extension(store): Extension<SharedStore>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id: TreeId = dto::parse_id(&id)?;
    let deleted = store
        .delete_tree(id)
        .await
        .map_err(|e| ApiError::rejected_write("trees.delete", e))?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    let total = store
        .count_trees()
        .await
        .map_err(|e| ApiError::rejected_write("trees.count", e))?;

    Ok(Json(json!({
        "success": true,
        "deleted": id,
        "total_trees": total,
    })))
}
