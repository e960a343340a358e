//! Farmers, forests and trees.
//!
//! The structs here are both the persisted shape and the wire shape: serializing
//! a `Farmer` yields `{id, name}`, a `Forest` yields `{id, name, location}` and a
//! `Tree` yields `{id, name, farmer_id, forest_id}`.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::{DomainError, DomainResult};
use crate::id::{FarmerId, ForestId, TreeId};

/// Upper bound on how many trees a single planting request may create.
pub const MAX_TREES_PER_REQUEST: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Farmer {
    pub id: FarmerId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forest {
    pub id: ForestId,
    pub name: String,
    pub location: Option<String>,
}

/// One planted tree. `name` is the species.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub id: TreeId,
    pub name: String,
    pub farmer_id: FarmerId,
    pub forest_id: ForestId,
}

impl Entity for Farmer {
    type Id = FarmerId;

    fn id(&self) -> FarmerId {
        self.id
    }
}

impl Entity for Forest {
    type Id = ForestId;

    fn id(&self) -> ForestId {
        self.id
    }
}

impl Entity for Tree {
    type Id = TreeId;

    fn id(&self) -> TreeId {
        self.id
    }
}

/// A farmer that has not been assigned an identity yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFarmer {
    pub name: String,
}

impl NewFarmer {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        Ok(Self {
            name: required_text("name", name.into())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewForest {
    pub name: String,
    pub location: Option<String>,
}

impl NewForest {
    pub fn new(name: impl Into<String>, location: Option<String>) -> DomainResult<Self> {
        Ok(Self {
            name: required_text("name", name.into())?,
            location,
        })
    }
}

/// Partial update of a forest's mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForestPatch {
    pub name: Option<String>,
    pub location: Option<String>,
}

impl ForestPatch {
    pub fn new(name: Option<String>, location: Option<String>) -> DomainResult<Self> {
        if name.is_none() && location.is_none() {
            return Err(DomainError::validation("nothing to update"));
        }
        let name = name.map(|n| required_text("name", n)).transpose()?;
        Ok(Self { name, location })
    }

    pub fn apply(&self, forest: &mut Forest) {
        if let Some(name) = &self.name {
            forest.name = name.clone();
        }
        if let Some(location) = &self.location {
            forest.location = Some(location.clone());
        }
    }
}

/// Template for a batch of identical trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTree {
    pub name: String,
    pub farmer_id: FarmerId,
    pub forest_id: ForestId,
}

impl NewTree {
    pub fn new(name: impl Into<String>, farmer_id: FarmerId, forest_id: ForestId) -> DomainResult<Self> {
        Ok(Self {
            name: required_text("name", name.into())?,
            farmer_id,
            forest_id,
        })
    }

    /// Validate a requested batch size.
    pub fn check_quantity(quantity: i64) -> DomainResult<u32> {
        if quantity < 1 || quantity > i64::from(MAX_TREES_PER_REQUEST) {
            return Err(DomainError::validation(format!(
                "quantity must be between 1 and {MAX_TREES_PER_REQUEST}"
            )));
        }
        Ok(quantity as u32)
    }
}

/// Which owner a tree tally is computed for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TallyScope {
    Farmer(FarmerId),
    Forest(ForestId),
}

impl TallyScope {
    pub fn contains(&self, tree: &Tree) -> bool {
        match self {
            TallyScope::Farmer(id) => tree.farmer_id == *id,
            TallyScope::Forest(id) => tree.forest_id == *id,
        }
    }
}

/// Trees of one owner, counted by species.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeTally {
    pub by_species: BTreeMap<String, u64>,
    pub total: u64,
    /// Distinct farmers among the counted trees.
    pub farmer_count: u64,
}

impl TreeTally {
    pub fn from_trees<'a>(trees: impl IntoIterator<Item = &'a Tree>) -> Self {
        let mut tally = TreeTally::default();
        let mut farmers = BTreeSet::new();
        for tree in trees {
            *tally.by_species.entry(tree.name.clone()).or_insert(0) += 1;
            tally.total += 1;
            farmers.insert(tree.farmer_id);
        }
        tally.farmer_count = farmers.len() as u64;
        tally
    }
}

fn required_text(field: &str, value: String) -> DomainResult<String> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(value)
}
