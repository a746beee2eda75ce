//! # Tycho Core
//!
//! Core scheduling library of the Tycho experiment control system:
//! resource-arbitrated, hierarchical session use cases booked through a
//! persistent agenda.
//!
//! ## Components
//!
//! - [`resource`]: token-based resource pools with hierarchical
//!   delegation against an external read-only catalog
//! - [`usecase`]: hierarchical use cases with a forward-only construction
//!   state machine, declarative requirement specifications, mounting and
//!   the dry-run/run execution protocol
//! - [`agenda`]: the session reservation dictionary, its persisted store
//!   and the background scheduling loop
//!
//! Structural violations surface as [`TychoError`]; run-stage outcomes
//! travel as [`usecase::StageCompletion`] status values.

pub mod agenda;
pub mod config;
pub mod error;
pub mod resource;
pub mod time;
pub mod usecase;

pub use agenda::{Agenda, SessionReservation};
pub use config::AgendaConfig;
pub use error::{TychoError, TychoResult};
pub use resource::{CardinalityProfile, CardinalityRequest, ResourceCatalog, ResourcePool};
pub use time::TimeInterval;
pub use usecase::{RunControl, StageCompletion, UseCase, UseCaseBehavior, UseCaseFactory};
