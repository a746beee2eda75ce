//! Resource arbitration: catalog surface, cardinality requests and the
//! token pool with hierarchical delegation.

pub mod cardinality;
pub mod catalog;
pub mod pool;

pub use cardinality::{CardinalityRequest, UNLIMITED_MARKER};
pub use catalog::{CatalogResource, MemoryCatalog, ResourceCatalog, ResourceId};
pub use pool::{CardinalityProfile, ResourcePool};
