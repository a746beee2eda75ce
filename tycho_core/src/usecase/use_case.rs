//! Hierarchical use case with its forward-only construction state machine
//! and the dry-run/run execution protocol.
//!
//! Behavior is injected as a boxed [`UseCaseBehavior`] (template method:
//! every hook has a working default, leaf behaviors override only what
//! they need). Construction mis-sequencing is a structural error; run
//! stage outcomes are [`StageCompletion`] values.

use super::composition::{CompositionDescription, DaughterEntry, UseCaseFactory};
use super::mounting::{MountLink, MountingTable, PortId};
use super::running::{
    RunControl, RunMode, RunStage, StageCompletion, StageDurations, WorkLoopStatus,
};
use super::spec::{validate_spec_key, ParametrisedResourceSpecifications};
use crate::error::{TychoError, TychoResult};
use crate::resource::CardinalityRequest;
use chrono::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Construction stages, strictly forward-only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConstructionStage {
    #[default]
    Undef,
    Ready,
    ConfigSetup,
    ConfigCompo,
    Composed,
    ScopeSpecs,
    DistributableMountSpecs,
    FunctionalSpecs,
    RelativeScope,
    Mounted,
    Constrained,
    ConfigSetupPostCompo,
}

/// Resource feasibility summary computed at the constrain stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceConstraints {
    pub functional: CardinalityRequest,
    pub distributable: CardinalityRequest,
}

/// Time feasibility summary computed at the constrain stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeConstraints {
    pub min_duration: Duration,
    pub max_duration: Option<Duration>,
}

/// Overridable lifecycle hooks of a use case.
///
/// Defaults make a leaf behavior that composes nothing, declares nothing
/// and succeeds through every run stage; composite behaviors override the
/// run hooks to drive their daughters.
pub trait UseCaseBehavior: Send {
    /// Daughters this behavior brings on its own, merged with the
    /// setup-provided composition at the config-composition stage.
    fn composition(&self) -> CompositionDescription {
        CompositionDescription::new()
    }

    /// Declare the parametrised device/resource slots this use case needs.
    fn declare_scope_specs(
        &self,
        _specs: &mut ParametrisedResourceSpecifications,
    ) -> TychoResult<()> {
        Ok(())
    }

    /// Mount directives this behavior supplies for its daughters' slots.
    /// Merged with any setup-provided links when the distributable
    /// mounting table is built, so directives travel with the model
    /// through every level of the tree.
    fn declare_distributable_mounts(&self) -> Vec<MountLink> {
        Vec::new()
    }

    /// Derive the resources actually exercised at run time from the
    /// resolved mounts.
    fn declare_functional_specs(
        &self,
        _specs: &mut ParametrisedResourceSpecifications,
        _mounts: &MountingTable,
    ) -> TychoResult<()> {
        Ok(())
    }

    /// Resource feasibility for dry-run constraint computation.
    fn build_resource_constraints(&self) -> TychoResult<Option<ResourceConstraints>> {
        Ok(None)
    }

    /// Time feasibility for dry-run constraint computation.
    fn build_time_constraints(&self) -> TychoResult<Option<TimeConstraints>> {
        Ok(None)
    }

    fn run_prepare(&mut self) -> TychoResult<()> {
        Ok(())
    }

    fn run_up(&mut self) -> TychoResult<()> {
        Ok(())
    }

    /// One work-loop iteration; return [`WorkLoopStatus::Stop`] to end
    /// the loop.
    fn run_work_iteration(&mut self) -> TychoResult<WorkLoopStatus> {
        Ok(WorkLoopStatus::Stop)
    }

    fn run_down(&mut self) -> TychoResult<()> {
        Ok(())
    }

    fn run_terminate(&mut self) -> TychoResult<()> {
        Ok(())
    }
}

/// Leaf behavior relying on every default hook
#[derive(Debug, Default)]
pub struct NoopBehavior;

impl UseCaseBehavior for NoopBehavior {}

/// A composed daughter: its declaration plus the instantiated node,
/// owned exclusively by the mother.
pub struct Daughter {
    pub entry: DaughterEntry,
    pub use_case: UseCase,
}

/// A node of the session use-case tree.
pub struct UseCase {
    name: String,
    instance_id: Uuid,
    behavior: Box<dyn UseCaseBehavior>,
    stage: ConstructionStage,
    config: serde_json::Map<String, serde_json::Value>,
    composition: CompositionDescription,
    daughters: BTreeMap<String, Daughter>,
    scope_specs: ParametrisedResourceSpecifications,
    functional_specs: ParametrisedResourceSpecifications,
    mounting_table: MountingTable,
    relative_scope: BTreeMap<String, String>,
    mount_points: BTreeMap<String, String>,
    durations: StageDurations,
    resource_constraints: Option<ResourceConstraints>,
    time_constraints: Option<TimeConstraints>,
    run_mode: RunMode,
    run_stage: RunStage,
    run_control: Option<Arc<RunControl>>,
}

impl UseCase {
    pub fn new(name: impl Into<String>, behavior: Box<dyn UseCaseBehavior>) -> Self {
        UseCase {
            name: name.into(),
            instance_id: Uuid::new_v4(),
            behavior,
            stage: ConstructionStage::Undef,
            config: serde_json::Map::new(),
            composition: CompositionDescription::new(),
            daughters: BTreeMap::new(),
            scope_specs: ParametrisedResourceSpecifications::new(),
            functional_specs: ParametrisedResourceSpecifications::new(),
            mounting_table: MountingTable::new(),
            relative_scope: BTreeMap::new(),
            mount_points: BTreeMap::new(),
            durations: StageDurations::new(),
            resource_constraints: None,
            time_constraints: None,
            run_mode: RunMode::Undef,
            run_stage: RunStage::Ready,
            run_control: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn construction_stage(&self) -> ConstructionStage {
        self.stage
    }

    pub fn run_mode(&self) -> RunMode {
        self.run_mode
    }

    pub fn run_stage(&self) -> RunStage {
        self.run_stage
    }

    pub fn config(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.config
    }

    pub fn composition(&self) -> &CompositionDescription {
        &self.composition
    }

    pub fn daughter(&self, name: &str) -> Option<&Daughter> {
        self.daughters.get(name)
    }

    pub fn daughter_names(&self) -> Vec<String> {
        self.daughters.keys().cloned().collect()
    }

    pub fn scope_specs(&self) -> &ParametrisedResourceSpecifications {
        &self.scope_specs
    }

    pub fn functional_specs(&self) -> &ParametrisedResourceSpecifications {
        &self.functional_specs
    }

    pub fn mounting_table(&self) -> &MountingTable {
        &self.mounting_table
    }

    /// Absolute path of a resolved mount point, available once mounted.
    pub fn mount_point(&self, port: &str) -> Option<&str> {
        self.mount_points.get(port).map(String::as_str)
    }

    pub fn durations(&self) -> &StageDurations {
        &self.durations
    }

    pub fn durations_mut(&mut self) -> &mut StageDurations {
        &mut self.durations
    }

    pub fn resource_constraints(&self) -> Option<&ResourceConstraints> {
        self.resource_constraints.as_ref()
    }

    pub fn time_constraints(&self) -> Option<&TimeConstraints> {
        self.time_constraints.as_ref()
    }

    fn check_stage(&self, expected: ConstructionStage, op: &str) -> TychoResult<()> {
        if self.stage != expected {
            return Err(TychoError::precondition(format!(
                "Use case '{}': operation '{}' requires construction stage {:?}, current stage is {:?}",
                self.name, op, expected, self.stage
            )));
        }
        Ok(())
    }

    /// Undef -> Ready. Validates the node name.
    pub fn ready(&mut self) -> TychoResult<()> {
        self.check_stage(ConstructionStage::Undef, "ready")?;
        validate_spec_key(&self.name)?;
        self.stage = ConstructionStage::Ready;
        log::debug!("Use case '{}' [{}] is ready", self.name, self.instance_id);
        Ok(())
    }

    /// Ready -> ConfigSetup. Stores the setup configuration properties.
    pub fn config_setup(
        &mut self,
        config: serde_json::Map<String, serde_json::Value>,
    ) -> TychoResult<()> {
        self.check_stage(ConstructionStage::Ready, "config_setup")?;
        self.config = config;
        self.stage = ConstructionStage::ConfigSetup;
        Ok(())
    }

    /// ConfigSetup -> ConfigCompo. Merges the behavior's own composition
    /// with the setup-provided one, then locks the result.
    pub fn config_composition(
        &mut self,
        setup_composition: Option<&CompositionDescription>,
    ) -> TychoResult<()> {
        self.check_stage(ConstructionStage::ConfigSetup, "config_composition")?;
        let mut compo = self.behavior.composition();
        if let Some(extra) = setup_composition {
            compo.merge(extra, true)?;
        }
        compo.lock();
        self.composition = compo;
        self.stage = ConstructionStage::ConfigCompo;
        Ok(())
    }

    /// ConfigCompo -> Composed. Instantiates each declared daughter
    /// through the factory and drives it to the same stage.
    pub fn compose(&mut self, factory: &UseCaseFactory) -> TychoResult<()> {
        self.check_stage(ConstructionStage::ConfigCompo, "compose")?;
        for (name, entry) in self.composition.clone().iter() {
            let behavior = factory.create(&entry.model_id)?;
            let mut daughter = UseCase::new(name.clone(), behavior);
            daughter.ready()?;
            daughter.config_setup(serde_json::Map::new())?;
            daughter.config_composition(None)?;
            // a mode selected before composition reaches the daughters
            // created here, and through them the whole subtree
            match self.run_mode {
                RunMode::DryRun => daughter.set_dry_run()?,
                RunMode::Run => {
                    if let Some(control) = &self.run_control {
                        daughter.set_run(Arc::clone(control))?;
                    }
                }
                RunMode::Undef | RunMode::Dead => {}
            }
            daughter.compose(factory)?;
            log::debug!(
                "Use case '{}': composed daughter '{}' of model '{}'",
                self.name,
                name,
                entry.model_id
            );
            self.daughters.insert(
                name.clone(),
                Daughter {
                    entry: entry.clone(),
                    use_case: daughter,
                },
            );
        }
        self.stage = ConstructionStage::Composed;
        Ok(())
    }

    /// Composed -> ScopeSpecs. The behavior declares its parametrised
    /// slots; the container is then locked.
    pub fn declare_scope_specs(&mut self) -> TychoResult<()> {
        self.check_stage(ConstructionStage::Composed, "declare_scope_specs")?;
        let mut specs = ParametrisedResourceSpecifications::new();
        self.behavior.declare_scope_specs(&mut specs)?;
        specs.lock();
        self.scope_specs = specs;
        for daughter in self.daughters.values_mut() {
            daughter.use_case.declare_scope_specs()?;
        }
        self.stage = ConstructionStage::ScopeSpecs;
        Ok(())
    }

    /// ScopeSpecs -> DistributableMountSpecs. Resolves every daughter
    /// slot to an inherited parent mount (checked for structural
    /// compatibility) or a setup-provided relative path; unresolved
    /// slots fail.
    pub fn build_distributable_mount_specs(
        &mut self,
        setup_mounts: &[MountLink],
    ) -> TychoResult<()> {
        self.check_stage(
            ConstructionStage::ScopeSpecs,
            "build_distributable_mount_specs",
        )?;
        // setup-provided links first, then the directives the behavior
        // carries for its own daughters
        let mut links: Vec<MountLink> = setup_mounts.to_vec();
        links.extend(self.behavior.declare_distributable_mounts());
        for (dname, daughter) in &self.daughters {
            for key in daughter.use_case.scope_specs.keys() {
                let port = PortId::daughter(dname.clone(), key.clone())?;
                let link = links
                    .iter()
                    .find(|l| l.from == port)
                    .ok_or_else(|| {
                        TychoError::precondition(format!(
                            "Use case '{}': no mount provided for daughter slot '{}'",
                            self.name, port
                        ))
                    })?;
                // an inherited parent mount must be structurally
                // compatible with the daughter's declared slot
                if self.scope_specs.has(&link.to_key) {
                    let parent_spec = self.scope_specs.get(&link.to_key)?;
                    let daughter_spec = daughter.use_case.scope_specs.get(&key)?;
                    daughter_spec.matches(parent_spec).map_err(|reason| {
                        TychoError::invalid_input(format!(
                            "Use case '{}': mount '{}' is incompatible: {}",
                            self.name, link, reason
                        ))
                    })?;
                } else if link.relative_path.is_none() {
                    return Err(TychoError::precondition(format!(
                        "Use case '{}': mount '{}' targets no parent slot and carries no relative path",
                        self.name, link
                    )));
                }
                self.mounting_table.add(link.clone())?;
            }
        }
        for daughter in self.daughters.values_mut() {
            daughter.use_case.build_distributable_mount_specs(&[])?;
        }
        self.stage = ConstructionStage::DistributableMountSpecs;
        Ok(())
    }

    /// DistributableMountSpecs -> FunctionalSpecs. The behavior derives
    /// the resources actually exercised at run time.
    pub fn build_functional_specs(&mut self) -> TychoResult<()> {
        self.check_stage(
            ConstructionStage::DistributableMountSpecs,
            "build_functional_specs",
        )?;
        let mut specs = ParametrisedResourceSpecifications::new();
        self.behavior
            .declare_functional_specs(&mut specs, &self.mounting_table)?;
        specs.lock();
        self.functional_specs = specs;
        for daughter in self.daughters.values_mut() {
            daughter.use_case.build_functional_specs()?;
        }
        self.stage = ConstructionStage::FunctionalSpecs;
        Ok(())
    }

    /// FunctionalSpecs -> RelativeScope. Normalizes every mounting-table
    /// entry to a path relative to this node's future mount point.
    pub fn resolve_relative_scope(&mut self) -> TychoResult<()> {
        self.check_stage(ConstructionStage::FunctionalSpecs, "resolve_relative_scope")?;
        for (port, link) in self.mounting_table.iter() {
            let rel = match &link.relative_path {
                Some(path) => format!("{}/{}", link.to_key, path),
                None => link.to_key.clone(),
            };
            self.relative_scope.insert(port.clone(), rel);
        }
        for daughter in self.daughters.values_mut() {
            daughter.use_case.resolve_relative_scope()?;
        }
        self.stage = ConstructionStage::RelativeScope;
        Ok(())
    }

    /// RelativeScope -> Mounted. Finalizes the mount-point dictionary
    /// with absolute setup paths, recursively for daughters.
    pub fn mount(&mut self, root_path: &str) -> TychoResult<()> {
        self.check_stage(ConstructionStage::RelativeScope, "mount")?;
        if root_path.is_empty() {
            return Err(TychoError::invalid_input("Empty mount root path"));
        }
        for (port, rel) in &self.relative_scope {
            self.mount_points
                .insert(port.clone(), format!("{}/{}", root_path, rel));
        }
        for daughter in self.daughters.values_mut() {
            daughter.use_case.mount(root_path)?;
        }
        self.stage = ConstructionStage::Mounted;
        log::debug!(
            "Use case '{}': mounted {} port(s) under '{}'",
            self.name,
            self.mount_points.len(),
            root_path
        );
        Ok(())
    }

    /// Mounted -> Constrained. Computes resource/time feasibility via
    /// the hooks in dry-run mode; in run mode it only advances.
    pub fn constrain(&mut self) -> TychoResult<()> {
        self.check_stage(ConstructionStage::Mounted, "constrain")?;
        if self.run_mode == RunMode::DryRun {
            self.resource_constraints = self.behavior.build_resource_constraints()?;
            self.time_constraints = match self.behavior.build_time_constraints()? {
                Some(tc) => Some(tc),
                None if self.durations != StageDurations::new() => Some(TimeConstraints {
                    min_duration: self.durations.total_min_duration(),
                    max_duration: self.durations.total_max_duration(),
                }),
                None => None,
            };
        }
        for daughter in self.daughters.values_mut() {
            daughter.use_case.constrain()?;
        }
        self.stage = ConstructionStage::Constrained;
        Ok(())
    }

    /// Constrained -> ConfigSetupPostCompo. Final configuration pass over
    /// the fully composed tree.
    pub fn config_setup_post_composition(
        &mut self,
        config: serde_json::Map<String, serde_json::Value>,
    ) -> TychoResult<()> {
        self.check_stage(
            ConstructionStage::Constrained,
            "config_setup_post_composition",
        )?;
        for (k, v) in config {
            self.config.insert(k, v);
        }
        for daughter in self.daughters.values_mut() {
            daughter
                .use_case
                .config_setup_post_composition(serde_json::Map::new())?;
        }
        self.stage = ConstructionStage::ConfigSetupPostCompo;
        log::info!(
            "Use case '{}' [{}] construction complete",
            self.name,
            self.instance_id
        );
        Ok(())
    }

    /// Select dry-run mode; fails once the mode has split.
    pub fn set_dry_run(&mut self) -> TychoResult<()> {
        if self.run_mode != RunMode::Undef {
            return Err(TychoError::precondition(format!(
                "Use case '{}': run mode is already {:?}",
                self.name, self.run_mode
            )));
        }
        self.run_mode = RunMode::DryRun;
        for daughter in self.daughters.values_mut() {
            daughter.use_case.set_dry_run()?;
        }
        Ok(())
    }

    /// Select run mode with the externally supplied run control; fails
    /// once the mode has split.
    pub fn set_run(&mut self, control: Arc<RunControl>) -> TychoResult<()> {
        if self.run_mode != RunMode::Undef {
            return Err(TychoError::precondition(format!(
                "Use case '{}': run mode is already {:?}",
                self.name, self.run_mode
            )));
        }
        for daughter in self.daughters.values_mut() {
            daughter.use_case.set_run(Arc::clone(&control))?;
        }
        self.run_mode = RunMode::Run;
        self.run_control = Some(control);
        Ok(())
    }

    /// Move any live mode to `Dead`. Idempotent.
    pub fn kill(&mut self) {
        self.run_mode = RunMode::Dead;
        for daughter in self.daughters.values_mut() {
            daughter.use_case.kill();
        }
    }

    fn check_runnable(&self, expected: RunStage, op: &str) -> TychoResult<()> {
        if self.run_mode != RunMode::Run {
            return Err(TychoError::precondition(format!(
                "Use case '{}': operation '{}' requires run mode, current mode is {:?}",
                self.name, op, self.run_mode
            )));
        }
        if self.stage != ConstructionStage::ConfigSetupPostCompo {
            return Err(TychoError::precondition(format!(
                "Use case '{}': operation '{}' requires completed construction",
                self.name, op
            )));
        }
        if self.run_stage != expected {
            return Err(TychoError::precondition(format!(
                "Use case '{}': operation '{}' requires run stage {:?}, current stage is {:?}",
                self.name, op, expected, self.run_stage
            )));
        }
        Ok(())
    }

    /// Ready -> Prepared on success; the stage is left un-advanced when
    /// the hook fails.
    pub fn run_prepare(&mut self) -> TychoResult<StageCompletion> {
        self.check_runnable(RunStage::Ready, "run_prepare")?;
        match self.behavior.run_prepare() {
            Ok(()) => {
                self.run_stage = RunStage::Prepared;
                Ok(StageCompletion::normal(RunStage::Preparing))
            }
            Err(e) => Ok(StageCompletion::error(RunStage::Preparing, e.to_string())),
        }
    }

    /// Prepared -> UpDone on success.
    pub fn run_up(&mut self) -> TychoResult<StageCompletion> {
        self.check_runnable(RunStage::Prepared, "run_up")?;
        match self.behavior.run_up() {
            Ok(()) => {
                self.run_stage = RunStage::UpDone;
                Ok(StageCompletion::normal(RunStage::UpRunning))
            }
            Err(e) => Ok(StageCompletion::error(RunStage::UpRunning, e.to_string())),
        }
    }

    /// UpDone -> WorkDone. Repeats the iteration hook until it signals
    /// stop, the hook fails, or a cooperative stop request is observed
    /// (then `Anticipated`).
    pub fn run_work(&mut self) -> TychoResult<StageCompletion> {
        self.check_runnable(RunStage::UpDone, "run_work")?;
        let control = self.run_control.as_ref().map(Arc::clone);
        loop {
            if let Some(ctrl) = &control {
                if ctrl.stop_requested() {
                    self.run_stage = RunStage::WorkDone;
                    return Ok(StageCompletion::anticipated(RunStage::WorkRunning));
                }
            }
            let status = match self.behavior.run_work_iteration() {
                Ok(status) => status,
                Err(e) => {
                    return Ok(StageCompletion::error(RunStage::WorkRunning, e.to_string()))
                }
            };
            if let Some(ctrl) = &control {
                ctrl.increment_work_loop();
            }
            if status == WorkLoopStatus::Stop {
                self.run_stage = RunStage::WorkDone;
                return Ok(StageCompletion::normal(RunStage::WorkRunning));
            }
        }
    }

    /// WorkDone -> DownDone on success.
    pub fn run_down(&mut self) -> TychoResult<StageCompletion> {
        self.check_runnable(RunStage::WorkDone, "run_down")?;
        match self.behavior.run_down() {
            Ok(()) => {
                self.run_stage = RunStage::DownDone;
                Ok(StageCompletion::normal(RunStage::DownRunning))
            }
            Err(e) => Ok(StageCompletion::error(RunStage::DownRunning, e.to_string())),
        }
    }

    /// DownDone -> Terminated on success; the mode then moves to `Dead`.
    pub fn run_terminate(&mut self) -> TychoResult<StageCompletion> {
        self.check_runnable(RunStage::DownDone, "run_terminate")?;
        match self.behavior.run_terminate() {
            Ok(()) => {
                self.run_stage = RunStage::Terminated;
                self.run_mode = RunMode::Dead;
                log::info!("Use case '{}' [{}] terminated", self.name, self.instance_id);
                Ok(StageCompletion::normal(RunStage::Terminating))
            }
            Err(e) => Ok(StageCompletion::error(
                RunStage::Terminating,
                e.to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for UseCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UseCase")
            .field("name", &self.name)
            .field("instance_id", &self.instance_id)
            .field("stage", &self.stage)
            .field("run_mode", &self.run_mode)
            .field("run_stage", &self.run_stage)
            .field("daughters", &self.daughters.keys().collect::<Vec<_>>())
            .finish()
    }
}
