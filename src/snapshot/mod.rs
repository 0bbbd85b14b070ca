//! Profile Snapshot Module
//!
//! Immutable evidence captured by the profiler from the live database:
//! - Column profiles (null / non-null counts, physical nullability)
//! - Unique key candidates (single column and composite)
//! - Observed foreign key realities (orphan detection)
//! - Coverage anomalies (objects the profiler could not fully evidence)
//!
//! The tightening engine only ever reads a snapshot through [`EvidenceIndex`].

pub mod evidence;

pub use evidence::EvidenceIndex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// schema.table.column
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnCoordinate {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl ColumnCoordinate {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    pub(crate) fn key(&self) -> String {
        format!("{}.{}.{}", self.schema, self.table, self.column).to_ascii_lowercase()
    }

    pub fn table_path(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl std::fmt::Display for ColumnCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.column)
    }
}

/// Complete evidence snapshot for one profiling run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    #[serde(default)]
    pub columns: Vec<ColumnProfile>,
    #[serde(default)]
    pub unique_candidates: Vec<UniqueCandidateProfile>,
    #[serde(default)]
    pub composite_unique_candidates: Vec<CompositeUniqueCandidateProfile>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyReality>,
    #[serde(default)]
    pub anomalies: Vec<ProfilingCoverageAnomaly>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl ProfileSnapshot {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
            && self.unique_candidates.is_empty()
            && self.composite_unique_candidates.is_empty()
            && self.foreign_keys.is_empty()
    }
}

/// Observed facts about a single column
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub schema: String,
    pub table: String,
    pub column: String,
    #[serde(default = "default_true")]
    pub is_nullable_physical: bool,
    #[serde(default)]
    pub is_computed: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_unique_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_definition: Option<String>,
    pub row_count: u64,
    pub null_count: u64,
}

impl ColumnProfile {
    pub fn coordinate(&self) -> ColumnCoordinate {
        ColumnCoordinate::new(&self.schema, &self.table, &self.column)
    }

    pub fn non_null_count(&self) -> u64 {
        self.row_count.saturating_sub(self.null_count)
    }
}

fn default_true() -> bool {
    true
}

/// Single-column unique candidate found by profiling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueCandidateProfile {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub has_duplicate: bool,
}

/// Multi-column unique candidate found by profiling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeUniqueCandidateProfile {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
    pub has_duplicate: bool,
}

/// The reference a foreign key reality was measured on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyReference {
    pub from_schema: String,
    pub from_table: String,
    pub from_column: String,
    pub to_schema: String,
    pub to_table: String,
    pub to_column: String,
    #[serde(default)]
    pub has_database_constraint: bool,
}

impl ForeignKeyReference {
    pub fn source(&self) -> ColumnCoordinate {
        ColumnCoordinate::new(&self.from_schema, &self.from_table, &self.from_column)
    }
}

/// Whether every non-null source value was found among the target keys
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyReality {
    pub reference: ForeignKeyReference,
    pub has_orphan: bool,
    #[serde(default)]
    pub orphan_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    ColumnUnprofiled,
    TableUnreadable,
    ProbeTimedOut,
    AmbiguousMapping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeOutcome {
    Succeeded,
    FallbackTimeout,
    Cancelled,
    Skipped,
}

/// An object the profiler could not fully evidence.
///
/// `column == None` covers every column of the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilingCoverageAnomaly {
    pub kind: AnomalyKind,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub message: String,
    pub remediation_hint: String,
    pub outcome: ProbeOutcome,
}
