//! Entity dependency sorter
//!
//! Produces a parents-first load order for the active entities of a model.
//! Ties are broken by effective name so the same model always sorts the same
//! way. Entities caught in cycles cannot be ordered; they are appended at the
//! end in name order and listed separately.

use crate::models::{EffectiveNameResolver, EntityIdentity, Model};
use crate::ordering::graph::EntityGraph;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityOrdering {
    /// Full load order, cyclic entities last
    pub ordered: Vec<EntityIdentity>,
    /// Entities that could not be placed before all of their parents
    pub cyclic: Vec<EntityIdentity>,
}

impl EntityOrdering {
    pub fn is_acyclic(&self) -> bool {
        self.cyclic.is_empty()
    }
}

pub struct EntityDependencySorter;

impl EntityDependencySorter {
    pub fn sort(model: &Model, naming: &dyn EffectiveNameResolver) -> EntityOrdering {
        let identities = model.entities().filter(|e| e.is_active).map(|e| e.identity());
        let graph = EntityGraph::build(identities, model, naming);
        if graph.is_empty() {
            return EntityOrdering::default();
        }

        let adjacency = graph.adjacency();
        let mut pending = vec![0usize; graph.len()];
        let mut children = vec![Vec::new(); graph.len()];
        for (child, parents) in adjacency.iter().enumerate() {
            pending[child] = parents.len();
            for &parent in parents {
                children[parent].push(child);
            }
        }

        let sort_key = |node: usize| (graph.name(node).to_ascii_lowercase(), node);
        let mut ready: BinaryHeap<Reverse<(String, usize)>> = (0..graph.len())
            .filter(|&n| pending[n] == 0)
            .map(|n| Reverse(sort_key(n)))
            .collect();

        let mut placed = vec![false; graph.len()];
        let mut ordered = Vec::with_capacity(graph.len());
        while let Some(Reverse((_, node))) = ready.pop() {
            placed[node] = true;
            ordered.push(graph.nodes()[node].identity.clone());
            for &child in &children[node] {
                pending[child] -= 1;
                if pending[child] == 0 {
                    ready.push(Reverse(sort_key(child)));
                }
            }
        }

        let mut remaining: Vec<usize> = (0..graph.len()).filter(|&n| !placed[n]).collect();
        remaining.sort_by_key(|&n| sort_key(n));
        let cyclic: Vec<EntityIdentity> = remaining
            .iter()
            .map(|&n| graph.nodes()[n].identity.clone())
            .collect();
        ordered.extend(cyclic.iter().cloned());

        if cyclic.is_empty() {
            info!("Sorted {} entities", ordered.len());
        } else {
            warn!(
                "Sorted {} entities; {} are in dependency cycles and were appended last",
                ordered.len(),
                cyclic.len()
            );
        }

        EntityOrdering { ordered, cyclic }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NamingOverrides;
    use crate::ordering::graph::tests::table;
    use crate::ordering::{CircularDependencyOptions, TopologicalOrderingValidator};

    fn names(entities: &[EntityIdentity]) -> Vec<&str> {
        entities.iter().map(|e| e.logical_name.as_str()).collect()
    }

    #[test]
    fn test_parents_first_ties_by_name() {
        let model = Model::new(vec![
            table("OrderLine", &[("Order", false), ("Product", false)]),
            table("Order", &[("Customer", false)]),
            table("Product", &[]),
            table("Customer", &[]),
        ]);
        let ordering = EntityDependencySorter::sort(&model, &NamingOverrides::default());
        assert!(ordering.is_acyclic());
        assert_eq!(names(&ordering.ordered), vec!["Customer", "Order", "Product", "OrderLine"]);
    }

    #[test]
    fn test_sorted_order_validates() {
        let model = Model::new(vec![
            table("Invoice", &[("Order", false)]),
            table("Order", &[("Customer", true)]),
            table("Customer", &[("Customer", true)]),
        ]);
        let naming = NamingOverrides::default();
        let ordering = EntityDependencySorter::sort(&model, &naming);
        let result = TopologicalOrderingValidator::validate(
            &ordering.ordered,
            Some(&model),
            &naming,
            &CircularDependencyOptions::default(),
        );
        assert!(result.is_valid);
    }

    #[test]
    fn test_cycle_members_appended() {
        let model = Model::new(vec![
            table("B", &[("A", true)]),
            table("A", &[("B", false)]),
            table("Z", &[]),
            table("C", &[("A", false)]),
        ]);
        let ordering = EntityDependencySorter::sort(&model, &NamingOverrides::default());
        assert_eq!(names(&ordering.ordered), vec!["Z", "A", "B", "C"]);
        assert_eq!(names(&ordering.cyclic), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_inactive_entities_are_skipped() {
        let mut inactive = table("Legacy", &[]);
        inactive.is_active = false;
        let model = Model::new(vec![inactive, table("Current", &[])]);
        let ordering = EntityDependencySorter::sort(&model, &NamingOverrides::default());
        assert_eq!(names(&ordering.ordered), vec!["Current"]);
    }
}
