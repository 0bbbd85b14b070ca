//! Policy decisions produced by the tightening engine

use crate::snapshot::{ColumnCoordinate, ProfilingCoverageAnomaly};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Column,
    UniqueIndex,
    ForeignKey,
}

/// schema.table.index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexCoordinate {
    pub schema: String,
    pub table: String,
    pub index: String,
}

impl std::fmt::Display for IndexCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.index)
    }
}

/// NOT NULL decision for one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NullabilityDecision {
    pub module: String,
    pub column: ColumnCoordinate,
    pub make_not_null: bool,
    pub requires_remediation: bool,
    pub rationales: Vec<String>,
}

/// Unique index decision for one candidate column set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueIndexDecision {
    pub module: String,
    pub index: IndexCoordinate,
    pub columns: Vec<String>,
    pub enforce_unique: bool,
    pub requires_remediation: bool,
    pub rationales: Vec<String>,
}

/// Foreign key decision for one relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDecision {
    pub module: String,
    pub column: ColumnCoordinate,
    pub referenced_table: String,
    pub create_constraint: bool,
    pub requires_remediation: bool,
    pub rationales: Vec<String>,
}

/// Borrowed view over any decision, for aggregation
#[derive(Debug, Clone, Copy)]
pub enum PolicyDecision<'a> {
    Column(&'a NullabilityDecision),
    UniqueIndex(&'a UniqueIndexDecision),
    ForeignKey(&'a ForeignKeyDecision),
}

impl<'a> PolicyDecision<'a> {
    pub fn kind(&self) -> DecisionKind {
        match self {
            PolicyDecision::Column(_) => DecisionKind::Column,
            PolicyDecision::UniqueIndex(_) => DecisionKind::UniqueIndex,
            PolicyDecision::ForeignKey(_) => DecisionKind::ForeignKey,
        }
    }

    pub fn module(&self) -> &'a str {
        match self {
            PolicyDecision::Column(d) => &d.module,
            PolicyDecision::UniqueIndex(d) => &d.module,
            PolicyDecision::ForeignKey(d) => &d.module,
        }
    }

    /// tighten / enforce / create
    pub fn outcome(&self) -> bool {
        match self {
            PolicyDecision::Column(d) => d.make_not_null,
            PolicyDecision::UniqueIndex(d) => d.enforce_unique,
            PolicyDecision::ForeignKey(d) => d.create_constraint,
        }
    }

    pub fn requires_remediation(&self) -> bool {
        match self {
            PolicyDecision::Column(d) => d.requires_remediation,
            PolicyDecision::UniqueIndex(d) => d.requires_remediation,
            PolicyDecision::ForeignKey(d) => d.requires_remediation,
        }
    }

    pub fn rationales(&self) -> &'a [String] {
        match self {
            PolicyDecision::Column(d) => &d.rationales,
            PolicyDecision::UniqueIndex(d) => &d.rationales,
            PolicyDecision::ForeignKey(d) => &d.rationales,
        }
    }
}

/// Which model predicates fired during a run, by predicate name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredicateTelemetry {
    pub counts: BTreeMap<String, usize>,
}

impl PredicateTelemetry {
    pub fn record(&mut self, predicate: &str) {
        *self.counts.entry(predicate.to_string()).or_insert(0) += 1;
    }

    pub fn count(&self, predicate: &str) -> usize {
        self.counts.get(predicate).copied().unwrap_or(0)
    }
}

/// Every decision from one engine run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecisionSet {
    pub nullability: Vec<NullabilityDecision>,
    pub unique_indexes: Vec<UniqueIndexDecision>,
    pub foreign_keys: Vec<ForeignKeyDecision>,
    pub anomalies: Vec<ProfilingCoverageAnomaly>,
    pub predicates: PredicateTelemetry,
}

impl PolicyDecisionSet {
    /// All decisions: columns, then unique indexes, then foreign keys
    pub fn iter(&self) -> impl Iterator<Item = PolicyDecision<'_>> {
        self.nullability
            .iter()
            .map(PolicyDecision::Column)
            .chain(self.unique_indexes.iter().map(PolicyDecision::UniqueIndex))
            .chain(self.foreign_keys.iter().map(PolicyDecision::ForeignKey))
    }

    pub fn len(&self) -> usize {
        self.nullability.len() + self.unique_indexes.len() + self.foreign_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, coordinate: &ColumnCoordinate) -> Option<&NullabilityDecision> {
        self.nullability.iter().find(|d| &d.column == coordinate)
    }

    pub fn foreign_key(&self, coordinate: &ColumnCoordinate) -> Option<&ForeignKeyDecision> {
        self.foreign_keys.iter().find(|d| &d.column == coordinate)
    }
}
