//! Rationale codes
//!
//! Machine-stable strings recorded on every decision. Downstream reports key
//! on these; renaming one is a breaking change for decision logs.

// Model and physical signals
pub const PRIMARY_KEY: &str = "primary-key";
pub const MODEL_DECLARED_MANDATORY: &str = "model-declared-mandatory";
pub const PHYSICAL_NOT_NULL: &str = "physical-not-null";
pub const PHYSICAL_UNIQUE: &str = "physical-unique";
pub const COMPUTED_COLUMN: &str = "computed-column";
pub const MODEL_DECLARED_UNIQUE: &str = "model-declared-unique";
pub const MODEL_DECLARED_RELATIONSHIP: &str = "model-declared-relationship";
pub const DB_CONSTRAINT_PRESENT: &str = "db-constraint-present";
pub const DELETE_RULE_IGNORE: &str = "delete-rule-ignore";
pub const CROSS_SCHEMA_REFERENCE: &str = "cross-schema-reference";

// Profiling evidence
pub const ALL_VALUES_NON_NULL: &str = "all-values-non-null";
pub const NULLS_OBSERVED: &str = "nulls-observed";
pub const NO_DUPLICATE_VALUES: &str = "no-duplicate-values";
pub const DUPLICATE_VALUES_OBSERVED: &str = "duplicate-values-observed";
pub const NO_ORPHANS_OBSERVED: &str = "no-orphans-observed";
pub const ORPHANS_OBSERVED: &str = "orphans-observed";
pub const PROFILE_DISCOVERED_UNIQUE: &str = "profile-discovered-unique";
pub const EVIDENCE_MISSING: &str = "evidence-missing";
pub const COVERAGE_ANOMALY: &str = "coverage-anomaly";
pub const INSUFFICIENT_EVIDENCE: &str = "insufficient-evidence";

// Policy gates
pub const NULLABILITY_DISABLED: &str = "nullability-tightening-disabled";
pub const UNIQUENESS_DISABLED: &str = "unique-enforcement-disabled";
pub const FOREIGN_KEY_CREATION_DISABLED: &str = "foreign-key-creation-disabled";
pub const CROSS_SCHEMA_BLOCKED: &str = "cross-schema-blocked";
pub const TARGET_ENTITY_MISSING: &str = "target-entity-missing";
pub const CAUTIOUS_MODE: &str = "cautious-mode";
pub const NULL_BUDGET_SATISFIED: &str = "null-budget-satisfied";

// Remediation
pub const REMEDIATE_BEFORE_TIGHTEN: &str = "remediate-before-tighten";
pub const REMEDIATION_FORCED: &str = "remediation-forced";
pub const ENFORCEMENT_DEFERRED: &str = "enforcement-deferred";
pub const NO_ACTION: &str = "no-action";
