//! Decision report
//!
//! Aggregates a [`PolicyDecisionSet`] into counts, per-module rollups and
//! rationale frequencies. Every map is a `BTreeMap` so the serialized report
//! is byte-stable across runs.

use crate::policy::decisions::{DecisionKind, PolicyDecision, PolicyDecisionSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rationales listed per module rollup
pub const TOP_RATIONALES: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionCounts {
    pub total: usize,
    /// tightened / enforced / created
    pub applied: usize,
    pub remediation: usize,
}

impl DecisionCounts {
    fn add(&mut self, decision: &PolicyDecision<'_>) {
        self.total += 1;
        if decision.outcome() {
            self.applied += 1;
        }
        if decision.requires_remediation() {
            self.remediation += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RationaleCount {
    pub code: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDecisionRollup {
    pub columns: DecisionCounts,
    pub unique_indexes: DecisionCounts,
    pub foreign_keys: DecisionCounts,
    pub top_rationales: Vec<RationaleCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDecisionReport {
    pub columns: DecisionCounts,
    pub unique_indexes: DecisionCounts,
    pub foreign_keys: DecisionCounts,
    pub column_rationales: BTreeMap<String, usize>,
    pub unique_index_rationales: BTreeMap<String, usize>,
    pub foreign_key_rationales: BTreeMap<String, usize>,
    pub modules: BTreeMap<String, ModuleDecisionRollup>,
    pub anomaly_count: usize,
}

impl PolicyDecisionReport {
    pub fn column_count(&self) -> usize {
        self.columns.total
    }

    pub fn decision_count(&self) -> usize {
        self.columns.total + self.unique_indexes.total + self.foreign_keys.total
    }
}

pub struct PolicyDecisionReporter;

impl PolicyDecisionReporter {
    pub fn create(set: &PolicyDecisionSet) -> PolicyDecisionReport {
        let mut report = PolicyDecisionReport {
            anomaly_count: set.anomalies.len(),
            ..Default::default()
        };
        let mut module_rationales: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

        for decision in set.iter() {
            let (counts, rationales) = match decision.kind() {
                DecisionKind::Column => (&mut report.columns, &mut report.column_rationales),
                DecisionKind::UniqueIndex => (&mut report.unique_indexes, &mut report.unique_index_rationales),
                DecisionKind::ForeignKey => (&mut report.foreign_keys, &mut report.foreign_key_rationales),
            };
            counts.add(&decision);
            for code in decision.rationales() {
                *rationales.entry(code.clone()).or_insert(0) += 1;
            }

            let rollup = report.modules.entry(decision.module().to_string()).or_default();
            match decision.kind() {
                DecisionKind::Column => rollup.columns.add(&decision),
                DecisionKind::UniqueIndex => rollup.unique_indexes.add(&decision),
                DecisionKind::ForeignKey => rollup.foreign_keys.add(&decision),
            }

            let frequencies = module_rationales.entry(decision.module().to_string()).or_default();
            for code in decision.rationales() {
                *frequencies.entry(code.clone()).or_insert(0) += 1;
            }
        }

        for (module, frequencies) in module_rationales {
            if let Some(rollup) = report.modules.get_mut(&module) {
                rollup.top_rationales = top_rationales(frequencies);
            }
        }

        report
    }
}

/// Highest counts first; ties broken by code, ascending
fn top_rationales(frequencies: BTreeMap<String, usize>) -> Vec<RationaleCount> {
    let mut ranked: Vec<RationaleCount> = frequencies
        .into_iter()
        .map(|(code, count)| RationaleCount { code, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
    ranked.truncate(TOP_RATIONALES);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::decisions::{ForeignKeyDecision, IndexCoordinate, NullabilityDecision, UniqueIndexDecision};
    use crate::snapshot::ColumnCoordinate;
    use pretty_assertions::assert_eq;

    fn column(module: &str, name: &str, tighten: bool, remediation: bool, rationales: &[&str]) -> NullabilityDecision {
        NullabilityDecision {
            module: module.to_string(),
            column: ColumnCoordinate::new("dbo", "T", name),
            make_not_null: tighten,
            requires_remediation: remediation,
            rationales: rationales.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn sample() -> PolicyDecisionSet {
        PolicyDecisionSet {
            nullability: vec![
                column("Sales", "A", true, false, &["all-values-non-null"]),
                column("Sales", "B", true, true, &["model-declared-mandatory", "nulls-observed"]),
                column("CRM", "C", false, false, &["evidence-missing", "insufficient-evidence"]),
            ],
            unique_indexes: vec![UniqueIndexDecision {
                module: "Sales".to_string(),
                index: IndexCoordinate {
                    schema: "dbo".to_string(),
                    table: "T".to_string(),
                    index: "UIX_T_A".to_string(),
                },
                columns: vec!["A".to_string()],
                enforce_unique: true,
                requires_remediation: false,
                rationales: vec!["no-duplicate-values".to_string(), "profile-discovered-unique".to_string()],
            }],
            foreign_keys: vec![ForeignKeyDecision {
                module: "Sales".to_string(),
                column: ColumnCoordinate::new("dbo", "T", "B"),
                referenced_table: "dbo.U".to_string(),
                create_constraint: false,
                requires_remediation: false,
                rationales: vec!["evidence-missing".to_string(), "insufficient-evidence".to_string()],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_counts_by_kind() {
        let report = PolicyDecisionReporter::create(&sample());
        assert_eq!(report.columns, DecisionCounts { total: 3, applied: 2, remediation: 1 });
        assert_eq!(report.unique_indexes, DecisionCounts { total: 1, applied: 1, remediation: 0 });
        assert_eq!(report.foreign_keys, DecisionCounts { total: 1, applied: 0, remediation: 0 });
        assert_eq!(report.column_count(), 3);
        assert_eq!(report.decision_count(), 5);
        assert_eq!(report.column_rationales.get("evidence-missing"), Some(&1));
        assert_eq!(report.foreign_key_rationales.get("insufficient-evidence"), Some(&1));
    }

    #[test]
    fn test_module_rollups_and_top_rationales() {
        let report = PolicyDecisionReporter::create(&sample());
        assert_eq!(report.modules.keys().collect::<Vec<_>>(), vec!["CRM", "Sales"]);

        let sales = &report.modules["Sales"];
        assert_eq!(sales.columns.total, 2);
        assert_eq!(sales.unique_indexes.applied, 1);
        assert_eq!(sales.foreign_keys.total, 1);
        // every Sales code appears once; ties fall back to code order
        assert_eq!(
            sales.top_rationales,
            vec![
                RationaleCount { code: "all-values-non-null".to_string(), count: 1 },
                RationaleCount { code: "evidence-missing".to_string(), count: 1 },
                RationaleCount { code: "insufficient-evidence".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn test_top_rationales_prefers_higher_counts() {
        let mut set = sample();
        set.nullability.push(column("Sales", "D", false, false, &["nulls-observed"]));
        let report = PolicyDecisionReporter::create(&set);
        assert_eq!(
            report.modules["Sales"].top_rationales[0],
            RationaleCount { code: "nulls-observed".to_string(), count: 2 }
        );
    }

    #[test]
    fn test_empty_set() {
        let report = PolicyDecisionReporter::create(&PolicyDecisionSet::default());
        assert_eq!(report, PolicyDecisionReport::default());
    }
}
