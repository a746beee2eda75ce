//! Token-based resource pool with hierarchical delegation.
//!
//! A pool owns a per-resource token budget for one scope: a root pool is
//! sized from the catalog, and a parent pool can delegate slices of its
//! budget to daughter pools (one per concurrent daughter use case), so
//! concurrent daughters never contend on the same token counter. Tokens
//! move back with [`ResourcePool::restore_parent_from_daughter`]; a
//! daughter dropped without restitution leaks its tokens permanently.

use super::cardinality::{CardinalityRequest, UNLIMITED_MARKER};
use super::catalog::{ResourceCatalog, ResourceId};
use crate::error::{TychoError, TychoResult};
use std::collections::{BTreeMap, BTreeSet};

/// Sizing policy applied to limited resources that have no explicit
/// cardinality override when a root pool is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalityProfile {
    /// One token per limited resource
    OneOnly,
    /// The full catalog budget per limited resource
    All,
    /// The full budget plus one token, for saturation testing
    AllPlusOne,
}

/// Per-scope resource token pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePool {
    initialized: bool,
    limited: BTreeMap<ResourceId, usize>,
    unlimited: BTreeSet<ResourceId>,
}

impl ResourcePool {
    /// Create an uninitialized pool.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Reset the pool to its uninitialized state, dropping all budgets.
    pub fn reset(&mut self) {
        self.initialized = false;
        self.limited.clear();
        self.unlimited.clear();
    }

    /// Size a root pool from the catalog.
    ///
    /// An explicit zero override excludes the resource entirely. Unlimited
    /// resources enter the pool as such; an override cardinality for an
    /// unlimited resource is accepted and ignored. Limited resources take
    /// the override when present (bounded by the catalog maximum) and the
    /// profile default otherwise.
    pub fn init_root(
        root: &mut ResourcePool,
        catalog: &dyn ResourceCatalog,
        overrides: &CardinalityRequest,
        profile: CardinalityProfile,
    ) -> TychoResult<()> {
        if root.is_initialized() {
            return Err(TychoError::precondition(
                "Target root resource pool is already initialized",
            ));
        }
        root.limited.clear();
        root.unlimited.clear();
        for id in catalog.resource_ids() {
            if overrides.is_inhibited(id) {
                continue;
            }
            if catalog.is_unlimited(id)? {
                root.unlimited.insert(id);
                continue;
            }
            let max = catalog.max_tokens(id)?;
            let tokens = match overrides.get(id) {
                Some(n) if n != UNLIMITED_MARKER => {
                    if n > max {
                        return Err(TychoError::invalid_input(format!(
                            "Requested token cardinality [{}] for resource [{}] exceeds the catalog maximum [{}]",
                            n, id, max
                        )));
                    }
                    n
                }
                _ => match profile {
                    CardinalityProfile::OneOnly => 1,
                    CardinalityProfile::All => max,
                    CardinalityProfile::AllPlusOne => max + 1,
                },
            };
            root.limited.insert(id, tokens);
        }
        root.initialized = true;
        log::debug!(
            "Root resource pool initialized: {} limited, {} unlimited",
            root.limited.len(),
            root.unlimited.len()
        );
        Ok(())
    }

    /// Split a slice of the parent's budget into an uninitialized daughter.
    ///
    /// Unlimited resources are granted without accounting; limited
    /// resources are transferred token by token. The transfer is
    /// all-or-nothing: on failure the parent's counters are unchanged.
    pub fn load_daughter_from_parent(
        parent: &mut ResourcePool,
        daughter: &mut ResourcePool,
        catalog: &dyn ResourceCatalog,
        requests: &CardinalityRequest,
    ) -> TychoResult<()> {
        if !parent.is_initialized() {
            return Err(TychoError::precondition(
                "Source parent resource pool is not initialized",
            ));
        }
        if daughter.is_initialized() {
            return Err(TychoError::precondition(
                "Target daughter resource pool is already initialized",
            ));
        }
        daughter.limited.clear();
        daughter.unlimited.clear();

        // Validation pass: no parent counter moves until every entry is
        // known to be satisfiable.
        for (id, count) in requests.iter() {
            if !parent.has_resource(id)? {
                return Err(TychoError::invalid_input(format!(
                    "Source parent resource pool has no resource with ID [{}]",
                    id
                )));
            }
            if count == 0 || catalog.is_unlimited(id)? {
                continue;
            }
            if count > parent.remaining_limited_tokens(id)? {
                return Err(TychoError::invalid_input(format!(
                    "Source parent resource pool has not enough tokens left for resource with ID [{}]",
                    id
                )));
            }
        }

        for (id, count) in requests.iter() {
            if count == 0 {
                continue;
            }
            if catalog.is_unlimited(id)? {
                daughter.unlimited.insert(id);
            } else {
                parent.decrement_limited_tokens(id, count)?;
                daughter.limited.insert(id, count);
            }
        }
        daughter.initialized = true;
        Ok(())
    }

    /// Return every token held by the daughter to the parent and reset the
    /// daughter. Must be invoked exactly once before the daughter is
    /// discarded.
    pub fn restore_parent_from_daughter(
        parent: &mut ResourcePool,
        daughter: &mut ResourcePool,
    ) -> TychoResult<()> {
        if !parent.is_initialized() {
            return Err(TychoError::precondition(
                "Parent resource pool is not initialized",
            ));
        }
        if !daughter.is_initialized() {
            return Err(TychoError::precondition(
                "Daughter resource pool is not initialized",
            ));
        }
        for (&id, &count) in &daughter.limited {
            parent.increment_limited_tokens(id, count)?;
        }
        daughter.reset();
        Ok(())
    }

    fn check_initialized(&self) -> TychoResult<()> {
        if !self.initialized {
            return Err(TychoError::precondition("Resource pool is not initialized"));
        }
        Ok(())
    }

    /// True if the pool owns the resource, limited or unlimited.
    pub fn has_resource(&self, id: ResourceId) -> TychoResult<bool> {
        self.check_initialized()?;
        Ok(self.unlimited.contains(&id) || self.limited.contains_key(&id))
    }

    pub fn is_limited(&self, id: ResourceId) -> TychoResult<bool> {
        self.check_initialized()?;
        Ok(self.limited.contains_key(&id))
    }

    pub fn is_unlimited(&self, id: ResourceId) -> TychoResult<bool> {
        self.check_initialized()?;
        Ok(self.unlimited.contains(&id))
    }

    /// True for a limited resource with no remaining tokens.
    pub fn is_exhausted(&self, id: ResourceId) -> TychoResult<bool> {
        self.check_initialized()?;
        Ok(self.limited.get(&id) == Some(&0))
    }

    /// Remaining token count; fails if the id is not a limited resource
    /// of this pool.
    pub fn remaining_limited_tokens(&self, id: ResourceId) -> TychoResult<usize> {
        self.check_initialized()?;
        self.limited.get(&id).copied().ok_or_else(|| {
            TychoError::invalid_input(format!("Resource with ID [{}] is not limited", id))
        })
    }

    /// True if `count` tokens could be transferred out right now.
    pub fn can_transfer(&self, id: ResourceId, count: usize) -> TychoResult<bool> {
        Ok(count <= self.remaining_limited_tokens(id)?)
    }

    /// Add an unlimited resource to an initialized pool.
    pub fn add_unlimited(&mut self, id: ResourceId) -> TychoResult<()> {
        self.check_initialized()?;
        if self.limited.contains_key(&id) {
            return Err(TychoError::invalid_input(format!(
                "Resource with ID [{}] is already held as limited",
                id
            )));
        }
        self.unlimited.insert(id);
        Ok(())
    }

    pub fn increment_limited_tokens(&mut self, id: ResourceId, step: usize) -> TychoResult<()> {
        self.check_initialized()?;
        let tokens = self.limited.get_mut(&id).ok_or_else(|| {
            TychoError::invalid_input(format!("Resource with ID [{}] is not limited", id))
        })?;
        *tokens += step;
        Ok(())
    }

    pub fn decrement_limited_tokens(&mut self, id: ResourceId, step: usize) -> TychoResult<()> {
        self.check_initialized()?;
        let tokens = self.limited.get_mut(&id).ok_or_else(|| {
            TychoError::invalid_input(format!("Resource with ID [{}] is not limited", id))
        })?;
        if step > *tokens {
            return Err(TychoError::invalid_input(format!(
                "Resource with ID [{}] has not enough remaining tokens",
                id
            )));
        }
        *tokens -= step;
        Ok(())
    }

    /// Identifiers of the limited resources held by this pool.
    pub fn limited_ids(&self) -> TychoResult<BTreeSet<ResourceId>> {
        self.check_initialized()?;
        Ok(self.limited.keys().copied().collect())
    }

    /// Identifiers of the unlimited resources held by this pool.
    pub fn unlimited_ids(&self) -> TychoResult<BTreeSet<ResourceId>> {
        self.check_initialized()?;
        Ok(self.unlimited.iter().copied().collect())
    }

    /// All resource identifiers held by this pool.
    pub fn all_ids(&self) -> TychoResult<BTreeSet<ResourceId>> {
        let mut all = self.limited_ids()?;
        all.extend(self.unlimited.iter().copied());
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::catalog::MemoryCatalog;

    const HV: ResourceId = 10; // limited, max 3
    const DAQ: ResourceId = 20; // limited, max 5
    const TEMP: ResourceId = 30; // unlimited

    fn catalog() -> MemoryCatalog {
        let mut cat = MemoryCatalog::new();
        cat.add_limited(HV, "setup/hv", 3).unwrap();
        cat.add_limited(DAQ, "setup/daq", 5).unwrap();
        cat.add_unlimited(TEMP, "setup/env/temperature").unwrap();
        cat
    }

    fn root(profile: CardinalityProfile) -> ResourcePool {
        let mut pool = ResourcePool::new();
        ResourcePool::init_root(&mut pool, &catalog(), &CardinalityRequest::new(), profile)
            .unwrap();
        pool
    }

    #[test]
    fn test_init_root_profiles() {
        let all = root(CardinalityProfile::All);
        assert_eq!(all.remaining_limited_tokens(HV).unwrap(), 3);
        assert_eq!(all.remaining_limited_tokens(DAQ).unwrap(), 5);
        assert!(all.is_unlimited(TEMP).unwrap());

        let one = root(CardinalityProfile::OneOnly);
        assert_eq!(one.remaining_limited_tokens(HV).unwrap(), 1);

        let plus = root(CardinalityProfile::AllPlusOne);
        assert_eq!(plus.remaining_limited_tokens(HV).unwrap(), 4);
    }

    #[test]
    fn test_init_root_overrides() {
        let cat = catalog();
        let mut req = CardinalityRequest::new();
        req.set_limited(HV, 2);
        req.unset(DAQ); // explicit zero excludes the resource
        req.set_limited(TEMP, 7); // ignored for an unlimited resource

        let mut pool = ResourcePool::new();
        ResourcePool::init_root(&mut pool, &cat, &req, CardinalityProfile::All).unwrap();
        assert_eq!(pool.remaining_limited_tokens(HV).unwrap(), 2);
        assert!(!pool.has_resource(DAQ).unwrap());
        assert!(pool.is_unlimited(TEMP).unwrap());
    }

    #[test]
    fn test_init_root_override_above_max_fails() {
        let mut req = CardinalityRequest::new();
        req.set_limited(HV, 4);
        let mut pool = ResourcePool::new();
        let res =
            ResourcePool::init_root(&mut pool, &catalog(), &req, CardinalityProfile::All);
        assert!(res.is_err());
        assert!(!pool.is_initialized());
    }

    #[test]
    fn test_double_init_fails() {
        let mut pool = root(CardinalityProfile::All);
        let res = ResourcePool::init_root(
            &mut pool,
            &catalog(),
            &CardinalityRequest::new(),
            CardinalityProfile::All,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_uninitialized_queries_fail() {
        let pool = ResourcePool::new();
        assert!(pool.has_resource(HV).is_err());
        assert!(pool.is_limited(HV).is_err());
        assert!(pool.remaining_limited_tokens(HV).is_err());
    }

    #[test]
    fn test_delegation_round_trip() {
        let cat = catalog();
        let mut parent = root(CardinalityProfile::All);
        let mut daughter = ResourcePool::new();

        let mut req = CardinalityRequest::new();
        req.set_limited(HV, 2);
        req.set_unlimited(TEMP);
        ResourcePool::load_daughter_from_parent(&mut parent, &mut daughter, &cat, &req).unwrap();

        assert_eq!(parent.remaining_limited_tokens(HV).unwrap(), 1);
        assert_eq!(daughter.remaining_limited_tokens(HV).unwrap(), 2);
        assert!(daughter.is_unlimited(TEMP).unwrap());
        // Unlimited grants do not change the parent
        assert!(parent.is_unlimited(TEMP).unwrap());

        ResourcePool::restore_parent_from_daughter(&mut parent, &mut daughter).unwrap();
        assert_eq!(parent.remaining_limited_tokens(HV).unwrap(), 3);
        assert!(!daughter.is_initialized());
    }

    #[test]
    fn test_overdraft_fails_without_side_effects() {
        let cat = catalog();
        let mut parent = root(CardinalityProfile::All);
        let before = parent.clone();
        let mut daughter = ResourcePool::new();

        let mut req = CardinalityRequest::new();
        req.set_limited(DAQ, 2); // fine on its own
        req.set_limited(HV, 4); // exceeds the parent's 3
        let res =
            ResourcePool::load_daughter_from_parent(&mut parent, &mut daughter, &cat, &req);
        assert!(res.is_err());
        assert_eq!(parent, before);
        assert!(!daughter.is_initialized());
    }

    #[test]
    fn test_zero_count_is_noop() {
        let cat = catalog();
        let mut parent = root(CardinalityProfile::All);
        let mut daughter = ResourcePool::new();
        let mut req = CardinalityRequest::new();
        req.set_limited(HV, 0);
        ResourcePool::load_daughter_from_parent(&mut parent, &mut daughter, &cat, &req).unwrap();
        assert!(daughter.is_initialized());
        assert!(!daughter.has_resource(HV).unwrap());
        assert_eq!(parent.remaining_limited_tokens(HV).unwrap(), 3);
    }

    #[test]
    fn test_exhaustion_is_a_query() {
        let cat = catalog();
        let mut parent = root(CardinalityProfile::All);
        let mut daughter = ResourcePool::new();
        let mut req = CardinalityRequest::new();
        req.set_limited(HV, 3);
        ResourcePool::load_daughter_from_parent(&mut parent, &mut daughter, &cat, &req).unwrap();
        assert!(parent.is_exhausted(HV).unwrap());
        assert!(!parent.can_transfer(HV, 1).unwrap());
        assert!(parent.can_transfer(DAQ, 5).unwrap());
    }

    #[test]
    fn test_repeated_delegations_are_idempotent_in_net_effect() {
        let cat = catalog();
        let mut parent = root(CardinalityProfile::All);
        for _ in 0..4 {
            let mut daughter = ResourcePool::new();
            let mut req = CardinalityRequest::new();
            req.set_limited(HV, 2);
            req.set_limited(DAQ, 5);
            ResourcePool::load_daughter_from_parent(&mut parent, &mut daughter, &cat, &req)
                .unwrap();
            ResourcePool::restore_parent_from_daughter(&mut parent, &mut daughter).unwrap();
        }
        assert_eq!(parent.remaining_limited_tokens(HV).unwrap(), 3);
        assert_eq!(parent.remaining_limited_tokens(DAQ).unwrap(), 5);
    }

    #[test]
    fn test_structural_equality() {
        let a = root(CardinalityProfile::All);
        let b = root(CardinalityProfile::All);
        let c = root(CardinalityProfile::OneOnly);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, ResourcePool::new());
    }
}
