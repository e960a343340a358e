use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use canopy_core::{
    Entity, Farmer, FarmerId, Forest, ForestId, ForestPatch, NewFarmer, NewForest, NewTree, TallyScope,
    Tree, TreeId, TreeTally,
};

use super::{EntityStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    farmers: BTreeMap<FarmerId, Farmer>,
    forests: BTreeMap<ForestId, Forest>,
    trees: BTreeMap<TreeId, Tree>,
    last_farmer: i64,
    last_forest: i64,
    last_tree: i64,
}

/// In-memory entity store.
///
/// Intended for tests/dev. Ids start at 1 per table and are never reused, like
/// a database sequence.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    tables: RwLock<Tables>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

fn put<E>(table: &mut BTreeMap<E::Id, E>, row: E) -> E
where
    E: Entity + Clone,
    E::Id: Ord,
{
    table.insert(row.id(), row.clone());
    row
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn list_farmers(&self) -> StoreResult<Vec<Farmer>> {
        Ok(self.read()?.farmers.values().cloned().collect())
    }

    async fn get_farmer(&self, id: FarmerId) -> StoreResult<Option<Farmer>> {
        Ok(self.read()?.farmers.get(&id).cloned())
    }

    async fn insert_farmer(&self, farmer: NewFarmer) -> StoreResult<Farmer> {
        let mut t = self.write()?;
        t.last_farmer += 1;
        let farmer = Farmer {
            id: FarmerId::new(t.last_farmer),
            name: farmer.name,
        };
        Ok(put(&mut t.farmers, farmer))
    }

    async fn rename_farmer(&self, id: FarmerId, name: String) -> StoreResult<Option<Farmer>> {
        let mut t = self.write()?;
        Ok(t.farmers.get_mut(&id).map(|farmer| {
            farmer.name = name;
            farmer.clone()
        }))
    }

    async fn delete_farmer(&self, id: FarmerId) -> StoreResult<bool> {
        let mut t = self.write()?;
        if t.farmers.remove(&id).is_none() {
            return Ok(false);
        }
        t.trees.retain(|_, tree| tree.farmer_id != id);
        Ok(true)
    }

    async fn count_farmers(&self) -> StoreResult<u64> {
        Ok(self.read()?.farmers.len() as u64)
    }

    async fn list_forests(&self) -> StoreResult<Vec<Forest>> {
        Ok(self.read()?.forests.values().cloned().collect())
    }

    async fn get_forest(&self, id: ForestId) -> StoreResult<Option<Forest>> {
        Ok(self.read()?.forests.get(&id).cloned())
    }

    async fn insert_forest(&self, forest: NewForest) -> StoreResult<Forest> {
        let mut t = self.write()?;
        t.last_forest += 1;
        let forest = Forest {
            id: ForestId::new(t.last_forest),
            name: forest.name,
            location: forest.location,
        };
        Ok(put(&mut t.forests, forest))
    }

    async fn update_forest(&self, id: ForestId, patch: ForestPatch) -> StoreResult<Option<Forest>> {
        let mut t = self.write()?;
        Ok(t.forests.get_mut(&id).map(|forest| {
            patch.apply(forest);
            forest.clone()
        }))
    }

    async fn delete_forest(&self, id: ForestId) -> StoreResult<bool> {
        let mut t = self.write()?;
        if t.forests.remove(&id).is_none() {
            return Ok(false);
        }
        t.trees.retain(|_, tree| tree.forest_id != id);
        Ok(true)
    }

    async fn count_forests(&self) -> StoreResult<u64> {
        Ok(self.read()?.forests.len() as u64)
    }

    async fn list_trees(&self) -> StoreResult<Vec<Tree>> {
        Ok(self.read()?.trees.values().cloned().collect())
    }

    async fn get_tree(&self, id: TreeId) -> StoreResult<Option<Tree>> {
        Ok(self.read()?.trees.get(&id).cloned())
    }

    async fn insert_trees(&self, tree: NewTree, quantity: u32) -> StoreResult<Vec<Tree>> {
        // Single write guard: the batch is checked and applied atomically.
        let mut t = self.write()?;
        if !t.farmers.contains_key(&tree.farmer_id) {
            return Err(StoreError::MissingReference(format!("farmer {}", tree.farmer_id)));
        }
        if !t.forests.contains_key(&tree.forest_id) {
            return Err(StoreError::MissingReference(format!("forest {}", tree.forest_id)));
        }

        let mut planted = Vec::with_capacity(quantity as usize);
        for _ in 0..quantity {
            t.last_tree += 1;
            let row = Tree {
                id: TreeId::new(t.last_tree),
                name: tree.name.clone(),
                farmer_id: tree.farmer_id,
                forest_id: tree.forest_id,
            };
            planted.push(put(&mut t.trees, row));
        }
        Ok(planted)
    }

    async fn delete_tree(&self, id: TreeId) -> StoreResult<bool> {
        Ok(self.write()?.trees.remove(&id).is_some())
    }

    async fn count_trees(&self) -> StoreResult<u64> {
        Ok(self.read()?.trees.len() as u64)
    }

    async fn tree_tally(&self, scope: TallyScope) -> StoreResult<TreeTally> {
        let t = self.read()?;
        Ok(TreeTally::from_trees(t.trees.values().filter(|tree| scope.contains(tree))))
    }
}
