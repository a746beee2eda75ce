//! Read-only resource catalog surface.
//!
//! The real catalog (devices, resources, their hierarchy) lives outside
//! this core; pools and matching only need the narrow query surface below.
//! Collaborators are injected explicitly where needed, there is no ambient
//! service registry.

use crate::error::{TychoError, TychoResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a catalogued resource
pub type ResourceId = i32;

/// Invalid resource identifier sentinel
pub const INVALID_RESOURCE_ID: ResourceId = -1;

/// Catalog record for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogResource {
    /// Unique resource identifier
    pub id: ResourceId,
    /// Resource path within the experiment setup
    pub path: String,
    /// True if the number of access tokens is unbounded
    pub unlimited: bool,
    /// Maximum number of simultaneous access tokens (limited resources)
    pub max_tokens: usize,
}

/// Read-only query surface over the external resource catalog
pub trait ResourceCatalog {
    /// Set of all catalogued resource identifiers
    fn resource_ids(&self) -> BTreeSet<ResourceId>;

    /// Look up one resource record; unknown ids fail.
    fn resource(&self, id: ResourceId) -> TychoResult<&CatalogResource>;

    /// True if the catalog knows the identifier
    fn has_resource(&self, id: ResourceId) -> bool {
        self.resource(id).is_ok()
    }

    /// True if the resource's token count is unbounded
    fn is_unlimited(&self, id: ResourceId) -> TychoResult<bool> {
        Ok(self.resource(id)?.unlimited)
    }

    /// Maximum token count for a limited resource
    fn max_tokens(&self, id: ResourceId) -> TychoResult<usize> {
        Ok(self.resource(id)?.max_tokens)
    }
}

/// In-memory catalog, used by tests and by embedders that already hold
/// the full catalog in another form.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    resources: BTreeMap<ResourceId, CatalogResource>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a limited resource with the given token budget.
    pub fn add_limited(
        &mut self,
        id: ResourceId,
        path: impl Into<String>,
        max_tokens: usize,
    ) -> TychoResult<()> {
        self.add(CatalogResource {
            id,
            path: path.into(),
            unlimited: false,
            max_tokens,
        })
    }

    /// Register a resource with an unbounded token count.
    pub fn add_unlimited(&mut self, id: ResourceId, path: impl Into<String>) -> TychoResult<()> {
        self.add(CatalogResource {
            id,
            path: path.into(),
            unlimited: true,
            max_tokens: 0,
        })
    }

    fn add(&mut self, record: CatalogResource) -> TychoResult<()> {
        if record.id < 0 {
            return Err(TychoError::invalid_input(format!(
                "Invalid resource ID [{}]",
                record.id
            )));
        }
        if self.resources.contains_key(&record.id) {
            return Err(TychoError::invalid_input(format!(
                "Resource with ID [{}] is already catalogued",
                record.id
            )));
        }
        self.resources.insert(record.id, record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceCatalog for MemoryCatalog {
    fn resource_ids(&self) -> BTreeSet<ResourceId> {
        self.resources.keys().copied().collect()
    }

    fn resource(&self, id: ResourceId) -> TychoResult<&CatalogResource> {
        self.resources.get(&id).ok_or_else(|| {
            TychoError::invalid_input(format!("No resource with ID [{}] in catalog", id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_catalog_lookup() {
        let mut cat = MemoryCatalog::new();
        cat.add_limited(3, "setup/hv/channel_0", 4).unwrap();
        cat.add_unlimited(7, "setup/env/temperature").unwrap();

        assert!(cat.has_resource(3));
        assert!(!cat.has_resource(5));
        assert!(!cat.is_unlimited(3).unwrap());
        assert!(cat.is_unlimited(7).unwrap());
        assert_eq!(cat.max_tokens(3).unwrap(), 4);
        assert_eq!(cat.resource_ids().len(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut cat = MemoryCatalog::new();
        cat.add_limited(1, "setup/a", 1).unwrap();
        assert!(cat.add_limited(1, "setup/b", 2).is_err());
        assert!(cat.add_limited(-2, "setup/c", 1).is_err());
        assert_eq!(cat.len(), 1);
    }
}
