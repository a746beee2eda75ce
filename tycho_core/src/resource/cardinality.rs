//! Per-resource token cardinality requests.
//!
//! A request maps resource identifiers to the number of tokens a session
//! or a use case asks for. An explicit zero inhibits the resource; an
//! unlimited resource is marked with [`UNLIMITED_MARKER`] (the count is
//! irrelevant for such resources, only presence matters).

use super::catalog::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker cardinality for resources requested as unlimited
pub const UNLIMITED_MARKER: usize = usize::MAX;

/// Request dictionary: resource id to requested token count
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityRequest {
    entries: BTreeMap<ResourceId, usize>,
}

impl CardinalityRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `count` tokens for a limited resource.
    pub fn set_limited(&mut self, id: ResourceId, count: usize) {
        self.entries.insert(id, count);
    }

    /// Mark an unlimited resource as requested.
    pub fn set_unlimited(&mut self, id: ResourceId) {
        self.entries.insert(id, UNLIMITED_MARKER);
    }

    /// Explicitly inhibit a resource by requesting zero tokens.
    pub fn unset(&mut self, id: ResourceId) {
        self.entries.insert(id, 0);
    }

    /// Drop any explicit request for the resource.
    pub fn remove(&mut self, id: ResourceId) {
        self.entries.remove(&id);
    }

    pub fn has(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// True if the resource is explicitly inhibited (zero cardinality).
    pub fn is_inhibited(&self, id: ResourceId) -> bool {
        self.entries.get(&id) == Some(&0)
    }

    pub fn get(&self, id: ResourceId) -> Option<usize> {
        self.entries.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceId, usize)> + '_ {
        self.entries.iter().map(|(id, n)| (*id, *n))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(ResourceId, usize)> for CardinalityRequest {
    fn from_iter<T: IntoIterator<Item = (ResourceId, usize)>>(iter: T) -> Self {
        CardinalityRequest {
            entries: iter.into_iter().collect(),
        }
    }
}
