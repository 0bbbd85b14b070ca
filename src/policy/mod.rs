//! Tightening policy
//!
//! - `engine`: decides NOT NULL, unique index and foreign key tightening
//! - `report`: aggregates decisions into counts and rollups
//! - `decision_log`: writes the audit log

pub mod decision_log;
pub mod decisions;
pub mod engine;
pub mod options;
pub mod rationale;
pub mod report;

pub use decision_log::{write_decision_log, DecisionLog, DecisionLogError};
pub use decisions::{
    DecisionKind, ForeignKeyDecision, IndexCoordinate, NullabilityDecision, PolicyDecision,
    PolicyDecisionSet, PredicateTelemetry, UniqueIndexDecision,
};
pub use engine::TighteningPolicy;
pub use options::{
    ForeignKeyOptions, NullabilityOptions, PolicyOptions, RemediationOptions, ScopeOptions,
    TighteningMode, TighteningOptions, UniquenessOptions,
};
pub use report::{
    DecisionCounts, ModuleDecisionRollup, PolicyDecisionReport, PolicyDecisionReporter,
    RationaleCount, TOP_RATIONALES,
};
