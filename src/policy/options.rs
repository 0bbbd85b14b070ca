//! Tightening options
//!
//! Gates which categories of tightening are attempted and how much evidence
//! each mode demands.
//!
//! JSON uses camelCase keys; snake_case aliases let the same blocks be
//! written in the TOML settings file.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// How much evidence a decision needs before it is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TighteningMode {
    /// Only model and physical signals; profiling alone never tightens
    Cautious,
    /// Model signals, or clean profiling evidence
    #[default]
    EvidenceGated,
    /// As evidence-gated, plus null-budget tightening and no remediation
    /// gate for declared-but-unevidenced objects
    Aggressive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyOptions {
    pub mode: TighteningMode,
    /// Fraction of rows allowed to be NULL for aggressive tightening
    #[validate(range(min = 0.0, max = 1.0, message = "nullBudget must be between 0 and 1"))]
    #[serde(alias = "null_budget")]
    pub null_budget: f64,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            mode: TighteningMode::EvidenceGated,
            null_budget: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopeOptions {
    /// Modules to examine; empty means all
    pub modules: Vec<String>,
}

impl ScopeOptions {
    pub fn includes(&self, module: &str) -> bool {
        self.modules.is_empty() || self.modules.iter().any(|m| m.eq_ignore_ascii_case(module))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NullabilityOptions {
    pub enabled: bool,
}

impl Default for NullabilityOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UniquenessOptions {
    #[serde(alias = "enforce_single_column")]
    pub enforce_single_column: bool,
    #[serde(alias = "enforce_multi_column")]
    pub enforce_multi_column: bool,
}

impl Default for UniquenessOptions {
    fn default() -> Self {
        Self {
            enforce_single_column: true,
            enforce_multi_column: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForeignKeyOptions {
    #[serde(alias = "enable_creation")]
    pub enable_creation: bool,
    #[serde(alias = "allow_cross_schema")]
    pub allow_cross_schema: bool,
}

impl Default for ForeignKeyOptions {
    fn default() -> Self {
        Self {
            enable_creation: true,
            allow_cross_schema: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemediationOptions {
    /// Conservative mode: every applied decision not already enforced by the
    /// database requires remediation
    pub force: bool,
    /// When false, remediation-gated decisions report `false` instead of
    /// the enforce intent
    #[serde(alias = "report_enforce_intent")]
    pub report_enforce_intent: bool,
}

impl Default for RemediationOptions {
    fn default() -> Self {
        Self {
            force: false,
            report_enforce_intent: true,
        }
    }
}

/// Complete tightening configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct TighteningOptions {
    #[validate(nested)]
    pub policy: PolicyOptions,
    pub scope: ScopeOptions,
    pub nullability: NullabilityOptions,
    pub uniqueness: UniquenessOptions,
    #[serde(alias = "foreign_keys")]
    pub foreign_keys: ForeignKeyOptions,
    pub remediation: RemediationOptions,
}

impl TighteningOptions {
    pub fn with_mode(mut self, mode: TighteningMode) -> Self {
        self.policy.mode = mode;
        self
    }

    pub fn conservative(mut self) -> Self {
        self.remediation.force = true;
        self
    }
}
