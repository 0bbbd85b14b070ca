//! JSON decision log
//!
//! Written next to the emitted artifacts so operators can audit why each
//! object was or was not tightened.

use crate::policy::decisions::{
    ForeignKeyDecision, NullabilityDecision, PolicyDecisionSet, UniqueIndexDecision,
};
use crate::policy::report::{DecisionCounts, ModuleDecisionRollup, PolicyDecisionReport};
use crate::snapshot::ProfilingCoverageAnomaly;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum DecisionLogError {
    #[error("Failed to serialize decision log: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write decision log to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionLogSummary {
    pub columns: DecisionCounts,
    pub unique_indexes: DecisionCounts,
    pub foreign_keys: DecisionCounts,
    pub anomalies: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionLogRationales<'a> {
    pub columns: &'a BTreeMap<String, usize>,
    pub unique_indexes: &'a BTreeMap<String, usize>,
    pub foreign_keys: &'a BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionLogRecords<'a> {
    pub columns: &'a [NullabilityDecision],
    pub unique_indexes: &'a [UniqueIndexDecision],
    pub foreign_keys: &'a [ForeignKeyDecision],
}

/// Borrowed view of a decision set and its report, shaped for serialization
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionLog<'a> {
    pub summary: DecisionLogSummary,
    pub rationales: DecisionLogRationales<'a>,
    pub modules: &'a BTreeMap<String, ModuleDecisionRollup>,
    pub decisions: DecisionLogRecords<'a>,
    pub predicates: &'a BTreeMap<String, usize>,
    pub anomalies: &'a [ProfilingCoverageAnomaly],
}

impl<'a> DecisionLog<'a> {
    pub fn build(set: &'a PolicyDecisionSet, report: &'a PolicyDecisionReport) -> Self {
        Self {
            summary: DecisionLogSummary {
                columns: report.columns,
                unique_indexes: report.unique_indexes,
                foreign_keys: report.foreign_keys,
                anomalies: report.anomaly_count,
            },
            rationales: DecisionLogRationales {
                columns: &report.column_rationales,
                unique_indexes: &report.unique_index_rationales,
                foreign_keys: &report.foreign_key_rationales,
            },
            modules: &report.modules,
            decisions: DecisionLogRecords {
                columns: &set.nullability,
                unique_indexes: &set.unique_indexes,
                foreign_keys: &set.foreign_keys,
            },
            predicates: &set.predicates.counts,
            anomalies: &set.anomalies,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, DecisionLogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Serialize the decision log and write it to `path`, creating parent
/// directories as needed.
pub async fn write_decision_log(
    path: impl AsRef<Path>,
    set: &PolicyDecisionSet,
    report: &PolicyDecisionReport,
) -> Result<(), DecisionLogError> {
    let path = path.as_ref();
    let json = DecisionLog::build(set, report).to_json_pretty()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| DecisionLogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::write(path, json.as_bytes())
        .await
        .map_err(|source| DecisionLogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    info!("Decision log written to {} ({} decisions)", path.display(), set.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::report::PolicyDecisionReporter;
    use crate::snapshot::ColumnCoordinate;

    fn sample() -> PolicyDecisionSet {
        let mut set = PolicyDecisionSet {
            nullability: vec![NullabilityDecision {
                module: "Sales".to_string(),
                column: ColumnCoordinate::new("dbo", "ORDER", "TOTAL"),
                make_not_null: true,
                requires_remediation: false,
                rationales: vec!["all-values-non-null".to_string()],
            }],
            ..Default::default()
        };
        set.predicates.record("model-declared-mandatory");
        set
    }

    #[test]
    fn test_log_layout() {
        let set = sample();
        let report = PolicyDecisionReporter::create(&set);
        let json = DecisionLog::build(&set, &report).to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["summary"]["columns"]["applied"], 1);
        assert_eq!(value["rationales"]["columns"]["all-values-non-null"], 1);
        assert_eq!(value["modules"]["Sales"]["columns"]["total"], 1);
        assert_eq!(value["decisions"]["columns"][0]["column"]["table"], "ORDER");
        assert_eq!(value["predicates"]["model-declared-mandatory"], 1);
        assert!(value["anomalies"].as_array().unwrap().is_empty());
        assert!(json.contains("\n  \"summary\""));
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("policy-decisions.json");
        let set = sample();
        let report = PolicyDecisionReporter::create(&set);

        write_decision_log(&path, &set, &report).await.unwrap();

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written, DecisionLog::build(&set, &report).to_json_pretty().unwrap());
    }
}
