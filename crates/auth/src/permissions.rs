use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are opaque scope strings issued by the identity provider
/// (e.g. "post:farmer"). They are compared by exact match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scopes guarding the mutating routes.
pub mod scopes {
    pub const POST_FARMER: &str = "post:farmer";
    pub const PATCH_FARMER: &str = "patch:farmer";
    pub const DELETE_FARMER: &str = "delete:farmer";
    pub const POST_FOREST: &str = "post:forest";
    pub const PATCH_FOREST: &str = "patch:forest";
    pub const DELETE_FOREST: &str = "delete:forest";
    pub const POST_TREE: &str = "post:tree";
    pub const DELETE_TREE: &str = "delete:tree";
}
