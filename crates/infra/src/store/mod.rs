//! Entity store boundary.
//!
//! This module defines the persistence operations the API needs for farmers,
//! forests and trees without making storage assumptions. Two implementations
//! exist: [`InMemoryEntityStore`] for tests/dev and [`PostgresEntityStore`].
//!
//! ## Deletion
//!
//! Deleting a forest or a farmer also deletes every tree that references it.
//!
//! ## Batches
//!
//! [`EntityStore::insert_trees`] is all-or-nothing: either every tree of the
//! batch is persisted or none is.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use canopy_core::{
    Farmer, FarmerId, Forest, ForestId, ForestPatch, NewFarmer, NewForest, NewTree, TallyScope,
    Tree, TreeId, TreeTally,
};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryEntityStore;
pub use postgres::PostgresEntityStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A referenced farmer or forest does not exist.
    #[error("referenced row missing: {0}")]
    MissingReference(String),

    #[error("database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn list_farmers(&self) -> StoreResult<Vec<Farmer>>;
    async fn get_farmer(&self, id: FarmerId) -> StoreResult<Option<Farmer>>;
    async fn insert_farmer(&self, farmer: NewFarmer) -> StoreResult<Farmer>;
    /// Returns `None` when the farmer does not exist.
    async fn rename_farmer(&self, id: FarmerId, name: String) -> StoreResult<Option<Farmer>>;
    /// Returns `false` when the farmer did not exist.
    async fn delete_farmer(&self, id: FarmerId) -> StoreResult<bool>;
    async fn count_farmers(&self) -> StoreResult<u64>;

    async fn list_forests(&self) -> StoreResult<Vec<Forest>>;
    async fn get_forest(&self, id: ForestId) -> StoreResult<Option<Forest>>;
    async fn insert_forest(&self, forest: NewForest) -> StoreResult<Forest>;
    async fn update_forest(&self, id: ForestId, patch: ForestPatch) -> StoreResult<Option<Forest>>;
    async fn delete_forest(&self, id: ForestId) -> StoreResult<bool>;
    async fn count_forests(&self) -> StoreResult<u64>;

    async fn list_trees(&self) -> StoreResult<Vec<Tree>>;
    async fn get_tree(&self, id: TreeId) -> StoreResult<Option<Tree>>;
    /// Plant `quantity` identical trees; ids come back in ascending order.
    async fn insert_trees(&self, tree: NewTree, quantity: u32) -> StoreResult<Vec<Tree>>;
    async fn delete_tree(&self, id: TreeId) -> StoreResult<bool>;
    async fn count_trees(&self) -> StoreResult<u64>;

    /// Trees of one farmer or forest, counted by species.
    async fn tree_tally(&self, scope: TallyScope) -> StoreResult<TreeTally>;
}

#[async_trait]
impl<S> EntityStore for Arc<S>
where
    S: EntityStore + ?Sized,
{
    async fn list_farmers(&self) -> StoreResult<Vec<Farmer>> {
        (**self).list_farmers().await
    }

    async fn get_farmer(&self, id: FarmerId) -> StoreResult<Option<Farmer>> {
        (**self).get_farmer(id).await
    }

    async fn insert_farmer(&self, farmer: NewFarmer) -> StoreResult<Farmer> {
        (**self).insert_farmer(farmer).await
    }

    async fn rename_farmer(&self, id: FarmerId, name: String) -> StoreResult<Option<Farmer>> {
        (**self).rename_farmer(id, name).await
    }

    async fn delete_farmer(&self, id: FarmerId) -> StoreResult<bool> {
        (**self).delete_farmer(id).await
    }

    async fn count_farmers(&self) -> StoreResult<u64> {
        (**self).count_farmers().await
    }

    async fn list_forests(&self) -> StoreResult<Vec<Forest>> {
        (**self).list_forests().await
    }

    async fn get_forest(&self, id: ForestId) -> StoreResult<Option<Forest>> {
        (**self).get_forest(id).await
    }

    async fn insert_forest(&self, forest: NewForest) -> StoreResult<Forest> {
        (**self).insert_forest(forest).await
    }

    async fn update_forest(&self, id: ForestId, patch: ForestPatch) -> StoreResult<Option<Forest>> {
        (**self).update_forest(id, patch).await
    }

    async fn delete_forest(&self, id: ForestId) -> StoreResult<bool> {
        (**self).delete_forest(id).await
    }

    async fn count_forests(&self) -> StoreResult<u64> {
        (**self).count_forests().await
    }

    async fn list_trees(&self) -> StoreResult<Vec<Tree>> {
        (**self).list_trees().await
    }

    async fn get_tree(&self, id: TreeId) -> StoreResult<Option<Tree>> {
        (**self).get_tree(id).await
    }

    async fn insert_trees(&self, tree: NewTree, quantity: u32) -> StoreResult<Vec<Tree>> {
        (**self).insert_trees(tree, quantity).await
    }

    async fn delete_tree(&self, id: TreeId) -> StoreResult<bool> {
        (**self).delete_tree(id).await
    }

    async fn count_trees(&self) -> StoreResult<u64> {
        (**self).count_trees().await
    }

    async fn tree_tally(&self, scope: TallyScope) -> StoreResult<TreeTally> {
        (**self).tree_tally(scope).await
    }
}
