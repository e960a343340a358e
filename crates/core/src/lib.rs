//! `canopy-core`: domain building blocks for farmers, forests and trees.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;
pub mod model;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{FarmerId, ForestId, TreeId};
pub use model::{
    Farmer, Forest, ForestPatch, NewFarmer, NewForest, NewTree, Tree, TreeTally, TallyScope,
    MAX_TREES_PER_REQUEST,
};
