//! Entity ordering
//!
//! Dependency sorting and validation of emission orders for seed and
//! bootstrap scripts. Both share one [`EntityGraph`] and one injected
//! effective-name resolver so that positions line up.

pub mod circular;
pub mod graph;
pub mod sorter;
pub mod validator;

pub use circular::{AllowedCycle, CircularDependencyOptions};
pub use graph::EntityGraph;
pub use sorter::{EntityDependencySorter, EntityOrdering};
pub use validator::{
    AllowanceKind, CycleAllowance, CycleDiagnostic, CycleForeignKey, OrderingViolation,
    TopologicalOrderingValidator, TopologicalValidationResult, ViolationKind,
};
