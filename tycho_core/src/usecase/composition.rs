//! Composition of daughter use cases and the behavior factory.

use super::use_case::UseCaseBehavior;
use crate::error::{TychoError, TychoResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a composite schedules its daughters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scheduling {
    #[default]
    Parallel,
    Serial,
    Repeat,
}

/// One declared daughter slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaughterEntry {
    /// Use-case model identifier, resolved through the factory
    pub model_id: String,
    /// Free-form description
    pub description: String,
    /// Position for serial scheduling
    pub serial_rank: i32,
    /// True when the entry came from the setup configuration rather than
    /// the behavior's own composition
    pub from_setup: bool,
}

/// Declarative description of a use case's daughters.
///
/// Write-once: after [`CompositionDescription::lock`] every mutation fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionDescription {
    daughters: BTreeMap<String, DaughterEntry>,
    scheduling: Scheduling,
    repetitions: usize,
    locked: bool,
}

impl CompositionDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduling(&self) -> Scheduling {
        self.scheduling
    }

    pub fn set_scheduling(&mut self, scheduling: Scheduling) -> TychoResult<()> {
        self.check_unlocked()?;
        self.scheduling = scheduling;
        Ok(())
    }

    /// Number of repetitions, meaningful for `Repeat` scheduling only.
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn set_repetitions(&mut self, repetitions: usize) -> TychoResult<()> {
        self.check_unlocked()?;
        if self.scheduling != Scheduling::Repeat {
            return Err(TychoError::precondition(
                "Repetitions only apply to repeat scheduling",
            ));
        }
        if repetitions == 0 {
            return Err(TychoError::invalid_input("Invalid zero repetition count"));
        }
        self.repetitions = repetitions;
        Ok(())
    }

    pub fn add_daughter(
        &mut self,
        name: &str,
        model_id: impl Into<String>,
        description: impl Into<String>,
        serial_rank: i32,
        from_setup: bool,
    ) -> TychoResult<()> {
        self.check_unlocked()?;
        super::spec::validate_spec_key(name)?;
        if self.daughters.contains_key(name) {
            return Err(TychoError::invalid_input(format!(
                "Daughter use case '{}' already exists",
                name
            )));
        }
        self.daughters.insert(
            name.to_string(),
            DaughterEntry {
                model_id: model_id.into(),
                description: description.into(),
                serial_rank,
                from_setup,
            },
        );
        Ok(())
    }

    pub fn remove_daughter(&mut self, name: &str) -> TychoResult<()> {
        self.check_unlocked()?;
        if self.daughters.remove(name).is_none() {
            return Err(TychoError::invalid_input(format!(
                "Daughter use case '{}' does not exist",
                name
            )));
        }
        Ok(())
    }

    pub fn has_daughter(&self, name: &str) -> bool {
        self.daughters.contains_key(name)
    }

    pub fn daughter(&self, name: &str) -> TychoResult<&DaughterEntry> {
        self.daughters.get(name).ok_or_else(|| {
            TychoError::invalid_input(format!("Daughter use case '{}' does not exist", name))
        })
    }

    /// Daughter names, in serial rank order for serial scheduling and in
    /// name order otherwise.
    pub fn daughter_names(&self) -> Vec<String> {
        let mut names: Vec<&String> = self.daughters.keys().collect();
        if self.scheduling == Scheduling::Serial {
            names.sort_by_key(|name| (self.daughters[*name].serial_rank, (*name).clone()));
        }
        names.into_iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DaughterEntry)> {
        self.daughters.iter()
    }

    pub fn len(&self) -> usize {
        self.daughters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.daughters.is_empty()
    }

    /// Merge another description into this one, marking the incoming
    /// entries with the given provenance. Fails on a scheduling conflict
    /// or a duplicate daughter name.
    pub fn merge(&mut self, other: &CompositionDescription, from_setup: bool) -> TychoResult<()> {
        self.check_unlocked()?;
        if !other.is_empty() && !self.is_empty() && self.scheduling != other.scheduling {
            return Err(TychoError::invalid_input(format!(
                "Cannot merge composition with scheduling {:?} into {:?}",
                other.scheduling, self.scheduling
            )));
        }
        for (name, entry) in other.iter() {
            self.add_daughter(
                name,
                entry.model_id.clone(),
                entry.description.clone(),
                entry.serial_rank,
                from_setup,
            )?;
        }
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    fn check_unlocked(&self) -> TychoResult<()> {
        if self.locked {
            return Err(TychoError::precondition("Composition description is locked"));
        }
        Ok(())
    }
}

type BehaviorCtor = Box<dyn Fn() -> Box<dyn UseCaseBehavior> + Send + Sync>;

/// Registry of use-case behavior constructors keyed by model identifier.
#[derive(Default)]
pub struct UseCaseFactory {
    ctors: BTreeMap<String, BehaviorCtor>,
}

impl UseCaseFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, model_id: &str, ctor: F) -> TychoResult<()>
    where
        F: Fn() -> Box<dyn UseCaseBehavior> + Send + Sync + 'static,
    {
        if self.ctors.contains_key(model_id) {
            return Err(TychoError::invalid_input(format!(
                "Use case model '{}' is already registered",
                model_id
            )));
        }
        self.ctors.insert(model_id.to_string(), Box::new(ctor));
        Ok(())
    }

    pub fn has_model(&self, model_id: &str) -> bool {
        self.ctors.contains_key(model_id)
    }

    pub fn model_ids(&self) -> Vec<String> {
        self.ctors.keys().cloned().collect()
    }

    pub fn create(&self, model_id: &str) -> TychoResult<Box<dyn UseCaseBehavior>> {
        let ctor = self.ctors.get(model_id).ok_or_else(|| {
            TychoError::invalid_input(format!("Unknown use case model '{}'", model_id))
        })?;
        Ok(ctor())
    }
}

impl std::fmt::Debug for UseCaseFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UseCaseFactory")
            .field("models", &self.model_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecase::use_case::NoopBehavior;

    #[test]
    fn test_daughter_entries_and_serial_order() {
        let mut compo = CompositionDescription::new();
        compo.set_scheduling(Scheduling::Serial).unwrap();
        compo.add_daughter("ramp_down", "hv/ramp", "", 2, false).unwrap();
        compo.add_daughter("ramp_up", "hv/ramp", "", 0, false).unwrap();
        compo.add_daughter("plateau", "hv/hold", "", 1, false).unwrap();

        assert!(compo.add_daughter("ramp_up", "hv/ramp", "", 3, false).is_err());
        assert_eq!(compo.daughter_names(), ["ramp_up", "plateau", "ramp_down"]);

        compo.lock();
        assert!(compo.remove_daughter("plateau").is_err());
    }

    #[test]
    fn test_repetitions_require_repeat_scheduling() {
        let mut compo = CompositionDescription::new();
        assert!(compo.set_repetitions(5).is_err());
        compo.set_scheduling(Scheduling::Repeat).unwrap();
        assert!(compo.set_repetitions(0).is_err());
        compo.set_repetitions(5).unwrap();
        assert_eq!(compo.repetitions(), 5);
    }

    #[test]
    fn test_merge_provenance_and_conflicts() {
        let mut base = CompositionDescription::new();
        base.add_daughter("monitor", "env/monitor", "", 0, false).unwrap();

        let mut extra = CompositionDescription::new();
        extra.add_daughter("logger", "env/logger", "", 0, false).unwrap();
        base.merge(&extra, true).unwrap();
        assert!(base.daughter("logger").unwrap().from_setup);
        assert!(!base.daughter("monitor").unwrap().from_setup);

        // duplicate daughter
        assert!(base.merge(&extra, true).is_err());

        let mut serial = CompositionDescription::new();
        serial.set_scheduling(Scheduling::Serial).unwrap();
        serial.add_daughter("other", "env/other", "", 0, false).unwrap();
        assert!(base.merge(&serial, false).is_err());
    }

    #[test]
    fn test_factory_registration() {
        let mut factory = UseCaseFactory::new();
        factory
            .register("generic/noop", || Box::new(NoopBehavior))
            .unwrap();
        assert!(factory.register("generic/noop", || Box::new(NoopBehavior)).is_err());
        assert!(factory.has_model("generic/noop"));
        assert!(factory.create("generic/noop").is_ok());
        assert!(factory.create("missing/model").is_err());
    }
}
