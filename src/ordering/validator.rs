//! Topological Ordering Validator
//!
//! Checks that an emission order loads every parent before its children.
//! Validation never fails: violations and cycles are reported as data and the
//! caller decides whether to abort emission.

use crate::models::{EffectiveNameResolver, EntityIdentity, Model, ReferentialAction};
use crate::ordering::circular::CircularDependencyOptions;
use crate::ordering::graph::EntityGraph;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The referenced table is not part of this ordering
    MissingParent,
    /// The referenced table is loaded after the child
    ChildBeforeParent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderingViolation {
    pub child_table: String,
    pub parent_table: String,
    pub foreign_key: String,
    pub child_position: usize,
    pub parent_position: Option<usize>,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleForeignKey {
    pub name: String,
    pub child_table: String,
    pub parent_table: String,
    pub columns: Vec<String>,
    pub is_nullable: bool,
    pub delete_rule: ReferentialAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceKind {
    /// A nullable foreign key lets the cycle load in two passes
    PhasedLoad,
    /// Allowed by configuration, but no foreign key can be left NULL
    MissingNullableBreak,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleAllowance {
    pub kind: AllowanceKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleDiagnostic {
    /// Member tables in ordering position order
    pub tables: Vec<String>,
    /// Closed walk through the cycle, first table repeated at the end
    pub path: Vec<String>,
    pub foreign_keys: Vec<CycleForeignKey>,
    pub is_allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowance: Option<CycleAllowance>,
}

impl CycleDiagnostic {
    pub fn has_nullable_break(&self) -> bool {
        self.foreign_keys.iter().any(|fk| fk.is_nullable)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologicalValidationResult {
    pub is_valid: bool,
    pub violations: Vec<OrderingViolation>,
    pub cycles: Vec<CycleDiagnostic>,
    /// Constraint-backed relationships examined
    pub checked_relationships: usize,
}

impl TopologicalValidationResult {
    fn trivially_valid() -> Self {
        Self {
            is_valid: true,
            ..Default::default()
        }
    }

    pub fn missing_parent_count(&self) -> usize {
        self.count(ViolationKind::MissingParent)
    }

    pub fn child_before_parent_count(&self) -> usize {
        self.count(ViolationKind::ChildBeforeParent)
    }

    fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }

    /// Every misordered pair sits inside a cycle that configuration allows
    pub fn all_cycles_allowed(&self) -> bool {
        let covered = |v: &OrderingViolation| {
            self.cycles.iter().any(|c| {
                c.is_allowed && c.tables.contains(&v.child_table) && c.tables.contains(&v.parent_table)
            })
        };
        self.violations
            .iter()
            .filter(|v| v.kind == ViolationKind::ChildBeforeParent)
            .all(covered)
    }

    /// Emission may continue: the order is valid, or every problem is an
    /// allowed cycle.
    pub fn can_proceed(&self) -> bool {
        self.is_valid || self.all_cycles_allowed()
    }
}

pub struct TopologicalOrderingValidator;

impl TopologicalOrderingValidator {
    pub fn validate(
        ordered: &[EntityIdentity],
        model: Option<&Model>,
        naming: &dyn EffectiveNameResolver,
        circular: &CircularDependencyOptions,
    ) -> TopologicalValidationResult {
        let model = match model {
            Some(m) if !m.is_empty() && !ordered.is_empty() => m,
            _ => {
                debug!("Ordering validation skipped: nothing to check");
                return TopologicalValidationResult::trivially_valid();
            }
        };

        let graph = EntityGraph::build(ordered.iter().cloned(), model, naming);
        let mut violations = Vec::new();

        // edges and unresolved references are both recorded in child order
        let mut unresolved = graph.unresolved().iter().peekable();
        let mut edges = graph.edges().iter().peekable();
        for child in 0..graph.len() {
            while let Some(edge) = edges.next_if(|e| e.child == child) {
                if edge.parent > child {
                    violations.push(OrderingViolation {
                        child_table: graph.name(child).to_string(),
                        parent_table: graph.name(edge.parent).to_string(),
                        foreign_key: edge.constraint.clone(),
                        child_position: child,
                        parent_position: Some(edge.parent),
                        kind: ViolationKind::ChildBeforeParent,
                    });
                }
            }
            while let Some(reference) = unresolved.next_if(|r| r.child == child) {
                violations.push(OrderingViolation {
                    child_table: graph.name(child).to_string(),
                    parent_table: reference.parent_name.clone(),
                    foreign_key: reference.constraint.clone(),
                    child_position: child,
                    parent_position: None,
                    kind: ViolationKind::MissingParent,
                });
            }
        }

        let misordered: HashSet<usize> = violations
            .iter()
            .filter(|v| v.kind == ViolationKind::ChildBeforeParent)
            .flat_map(|v| [Some(v.child_position), v.parent_position])
            .flatten()
            .collect();

        let cycles = if misordered.is_empty() {
            Vec::new()
        } else {
            graph
                .cyclic_components()
                .into_iter()
                .filter(|component| component.iter().any(|n| misordered.contains(n)))
                .map(|component| Self::diagnose(&graph, &component, circular))
                .collect()
        };

        let is_valid = misordered.is_empty();
        let result = TopologicalValidationResult {
            is_valid,
            violations,
            cycles,
            checked_relationships: graph.edges().len() + graph.unresolved().len(),
        };

        if is_valid {
            info!(
                "Ordering of {} entities is valid ({} relationships, {} missing parents)",
                graph.len(),
                result.checked_relationships,
                result.missing_parent_count()
            );
        } else {
            warn!(
                "Ordering of {} entities has {} child-before-parent violations across {} cycles",
                graph.len(),
                result.child_before_parent_count(),
                result.cycles.len()
            );
        }

        result
    }

    fn diagnose(graph: &EntityGraph, component: &[usize], circular: &CircularDependencyOptions) -> CycleDiagnostic {
        let tables: Vec<String> = component.iter().map(|&n| graph.name(n).to_string()).collect();
        let path = graph
            .cycle_path(component)
            .into_iter()
            .map(|n| graph.name(n).to_string())
            .collect();

        let foreign_keys: Vec<CycleForeignKey> = graph
            .edges()
            .iter()
            .filter(|e| e.child != e.parent && component.contains(&e.child) && component.contains(&e.parent))
            .map(|e| CycleForeignKey {
                name: e.constraint.clone(),
                child_table: graph.name(e.child).to_string(),
                parent_table: graph.name(e.parent).to_string(),
                columns: e.columns.clone(),
                is_nullable: e.is_nullable,
                delete_rule: e.delete_rule,
            })
            .collect();

        let is_allowed = circular.is_cycle_allowed(&tables);
        let allowance = is_allowed.then(|| {
            let configured = circular
                .reason_for(&tables)
                .map(|r| format!(" ({})", r))
                .unwrap_or_default();
            match foreign_keys.iter().find(|fk| fk.is_nullable) {
                Some(fk) => CycleAllowance {
                    kind: AllowanceKind::PhasedLoad,
                    reason: format!(
                        "Allowed cycle{}: load {} with {} NULL, then backfill through {}",
                        configured,
                        fk.child_table,
                        fk.columns.join(", "),
                        fk.name
                    ),
                },
                None => CycleAllowance {
                    kind: AllowanceKind::MissingNullableBreak,
                    reason: format!(
                        "Allowed cycle{} has no nullable foreign key; phased loading cannot break it",
                        configured
                    ),
                },
            }
        });

        if let Some(CycleAllowance { kind: AllowanceKind::MissingNullableBreak, .. }) = &allowance {
            warn!("Allowed cycle {} has no nullable foreign key", tables.join(" -> "));
        }

        CycleDiagnostic {
            tables,
            path,
            foreign_keys,
            is_allowed,
            allowance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityModel, NamingOverrideRule, NamingOverrides};
    use crate::ordering::circular::AllowedCycle;
    use crate::ordering::graph::tests::table;
    use pretty_assertions::assert_eq;

    fn order(model: &Model, names: &[&str]) -> Vec<EntityIdentity> {
        names
            .iter()
            .filter_map(|n| model.find_entity(n).map(EntityModel::identity))
            .collect()
    }

    fn validate(model: &Model, names: &[&str], circular: &CircularDependencyOptions) -> TopologicalValidationResult {
        TopologicalOrderingValidator::validate(&order(model, names), Some(model), &NamingOverrides::default(), circular)
    }

    #[test]
    fn test_parent_first_is_valid() {
        let model = Model::new(vec![table("Parent", &[]), table("Child", &[("Parent", false)])]);
        let result = validate(&model, &["Parent", "Child"], &CircularDependencyOptions::default());
        assert!(result.is_valid);
        assert!(result.violations.is_empty());
        assert_eq!(result.checked_relationships, 1);
    }

    #[test]
    fn test_child_before_parent() {
        let model = Model::new(vec![table("Parent", &[]), table("Child", &[("Parent", false)])]);
        let result = validate(&model, &["Child", "Parent"], &CircularDependencyOptions::default());

        assert!(!result.is_valid);
        assert_eq!(
            result.violations,
            vec![OrderingViolation {
                child_table: "CHILD".to_string(),
                parent_table: "PARENT".to_string(),
                foreign_key: "FK_CHILD_PARENT".to_string(),
                child_position: 0,
                parent_position: Some(1),
                kind: ViolationKind::ChildBeforeParent,
            }]
        );
        // misordered, but not a cycle
        assert!(result.cycles.is_empty());
        assert!(!result.can_proceed());
    }

    #[test]
    fn test_missing_parent_does_not_invalidate() {
        let model = Model::new(vec![table("Parent", &[]), table("Child", &[("Parent", false)])]);
        let result = validate(&model, &["Child"], &CircularDependencyOptions::default());
        assert!(result.is_valid);
        assert_eq!(result.missing_parent_count(), 1);
        assert_eq!(result.violations[0].parent_position, None);
        assert_eq!(result.violations[0].parent_table, "PARENT");
    }

    #[test]
    fn test_self_reference_is_valid() {
        let model = Model::new(vec![table("Employee", &[("Employee", true)])]);
        let result = validate(&model, &["Employee"], &CircularDependencyOptions::default());
        assert!(result.is_valid);
        assert!(result.violations.is_empty());
        assert!(result.cycles.is_empty());
    }

    #[test]
    fn test_allowed_cycle_with_nullable_break() {
        let model = Model::new(vec![table("A", &[("B", true)]), table("B", &[("A", false)])]);
        let circular = CircularDependencyOptions::new(vec![AllowedCycle::new(["A", "B"])]);
        let result = validate(&model, &["A", "B"], &circular);

        assert!(!result.is_valid);
        assert_eq!(result.cycles.len(), 1);
        let cycle = &result.cycles[0];
        assert_eq!(cycle.tables, vec!["A", "B"]);
        assert_eq!(cycle.path, vec!["A", "B", "A"]);
        assert!(cycle.is_allowed);
        assert!(cycle.has_nullable_break());
        assert_eq!(cycle.allowance.as_ref().map(|a| a.kind), Some(AllowanceKind::PhasedLoad));
        assert!(result.can_proceed());
    }

    #[test]
    fn test_allowed_cycle_without_nullable_break_warns() {
        let model = Model::new(vec![table("A", &[("B", false)]), table("B", &[("A", false)])]);
        let circular = CircularDependencyOptions::new(vec![AllowedCycle::new(["A", "B"])]);
        let result = validate(&model, &["A", "B"], &circular);

        let cycle = &result.cycles[0];
        assert!(cycle.is_allowed);
        let allowance = cycle.allowance.as_ref().unwrap();
        assert_eq!(allowance.kind, AllowanceKind::MissingNullableBreak);
        assert!(allowance.reason.contains("no nullable foreign key"));
    }

    #[test]
    fn test_unlisted_cycle_is_not_allowed() {
        let model = Model::new(vec![table("A", &[("B", true)]), table("B", &[("A", false)])]);
        let result = validate(&model, &["A", "B"], &CircularDependencyOptions::default());
        assert!(!result.cycles[0].is_allowed);
        assert_eq!(result.cycles[0].allowance, None);
        assert!(!result.can_proceed());
    }

    #[test]
    fn test_independent_cycles_stay_separate() {
        let model = Model::new(vec![
            table("A", &[("B", true)]),
            table("B", &[("A", true)]),
            table("C", &[("D", true)]),
            table("D", &[("C", true)]),
        ]);
        let result = validate(&model, &["A", "B", "C", "D"], &CircularDependencyOptions::default());
        assert_eq!(result.cycles.len(), 2);
        assert_eq!(result.cycles[1].tables, vec!["C", "D"]);
    }

    #[test]
    fn test_positions_use_effective_names() {
        let model = Model::new(vec![table("Parent", &[]), table("Child", &[("Parent", false)])]);
        let naming = NamingOverrides::new(vec![NamingOverrideRule::for_table(None, "PARENT", "Root")]);
        let result = TopologicalOrderingValidator::validate(
            &order(&model, &["Child", "Parent"]),
            Some(&model),
            &naming,
            &CircularDependencyOptions::default(),
        );
        assert_eq!(result.violations[0].parent_table, "Root");
    }

    #[test]
    fn test_empty_inputs_short_circuit() {
        let model = Model::new(vec![table("A", &[])]);
        let circular = CircularDependencyOptions::default();
        let naming = NamingOverrides::default();

        let empty_order = TopologicalOrderingValidator::validate(&[], Some(&model), &naming, &circular);
        assert_eq!(empty_order, TopologicalValidationResult::trivially_valid());

        let identities = order(&model, &["A"]);
        let no_model = TopologicalOrderingValidator::validate(&identities, None, &naming, &circular);
        assert!(no_model.is_valid && no_model.violations.is_empty() && no_model.cycles.is_empty());

        let empty_model = TopologicalOrderingValidator::validate(&identities, Some(&Model::default()), &naming, &circular);
        assert!(empty_model.is_valid);
    }
}
