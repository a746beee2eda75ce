//! Use cases: parametrised requirement specifications, composition,
//! mounting and the construction/run state machines.

pub mod composition;
pub mod mounting;
pub mod running;
pub mod spec;
pub mod use_case;

pub use composition::{CompositionDescription, DaughterEntry, Scheduling, UseCaseFactory};
pub use mounting::{MountLink, MountingTable, PortId, RelativePath};
pub use running::{
    RunControl, RunMode, RunStage, RunTermination, StageCompletion, StageDurations,
    WorkLoopStatus,
};
pub use spec::{
    AccessMode, DataType, DeviceType, ParametrisedResourceSpecifications, ResourceCategory,
    ResourceSpecEntry,
};
pub use use_case::{
    ConstructionStage, Daughter, NoopBehavior, ResourceConstraints, TimeConstraints, UseCase,
    UseCaseBehavior,
};
