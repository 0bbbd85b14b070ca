//! Index-based dependency graph
//!
//! Nodes are entities addressed by position; edges run child -> parent, one
//! per constraint-backed relationship. Cycle detection works on indices, so a
//! cyclic schema never causes unbounded traversal.

use crate::models::{
    ActualConstraint, EffectiveNameResolver, EntityIdentity, EntityModel, Model, ReferentialAction,
    RelationshipModel,
};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub identity: EntityIdentity,
    /// Effective name after naming overrides
    pub name: String,
    key: String,
}

/// child -> parent, backed by a database constraint
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub child: usize,
    pub parent: usize,
    pub constraint: String,
    pub columns: Vec<String>,
    pub is_nullable: bool,
    pub delete_rule: ReferentialAction,
}

/// A constraint whose parent is not a node of the graph
#[derive(Debug, Clone)]
pub struct UnresolvedReference {
    pub child: usize,
    pub parent_name: String,
    pub constraint: String,
}

#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<DependencyEdge>,
    unresolved: Vec<UnresolvedReference>,
    index: HashMap<String, usize>,
}

impl EntityGraph {
    /// Build a graph over `identities`, in the given order.
    ///
    /// Identities are joined to `model` through `naming.lookup_key`; repeats of
    /// an identity keep their first position.
    pub fn build<I>(identities: I, model: &Model, naming: &dyn EffectiveNameResolver) -> Self
    where
        I: IntoIterator<Item = EntityIdentity>,
    {
        let mut graph = Self::default();

        for identity in identities {
            let key = naming.lookup_key(&identity);
            if graph.index.contains_key(&key) {
                debug!("Skipping repeated entity {} in ordering", identity);
                continue;
            }
            graph.index.insert(key.clone(), graph.nodes.len());
            graph.nodes.push(GraphNode {
                name: naming.effective_name(&identity),
                identity,
                key,
            });
        }

        let mut definitions: HashMap<String, &EntityModel> = HashMap::new();
        for entity in model.entities() {
            definitions
                .entry(naming.lookup_key(&entity.identity()))
                .or_insert(entity);
        }

        for child in 0..graph.nodes.len() {
            let Some(entity) = definitions.get(&graph.nodes[child].key).copied() else {
                continue;
            };
            for relationship in &entity.relationships {
                for constraint in &relationship.actual_constraints {
                    graph.add_constraint(child, model, entity, relationship, constraint, naming);
                }
            }
        }

        graph
    }

    fn add_constraint(
        &mut self,
        child: usize,
        model: &Model,
        entity: &EntityModel,
        relationship: &RelationshipModel,
        constraint: &ActualConstraint,
        naming: &dyn EffectiveNameResolver,
    ) {
        let parent_identity = resolve_parent(model, entity, relationship, constraint);
        let parent_key = naming.lookup_key(&parent_identity);

        match self.index.get(&parent_key).copied() {
            Some(parent) => {
                let columns = if constraint.owner_columns.is_empty() {
                    entity
                        .attribute(&relationship.via_attribute)
                        .map(|a| vec![a.column_name.clone()])
                        .unwrap_or_default()
                } else {
                    constraint.owner_columns.clone()
                };
                // every owner column must accept NULL for the edge to be breakable
                let is_nullable = !columns.is_empty()
                    && columns.iter().all(|c| {
                        entity
                            .attribute_by_column(c)
                            .is_some_and(|a| a.is_nullable())
                    });
                self.edges.push(DependencyEdge {
                    child,
                    parent,
                    constraint: constraint.name.clone(),
                    columns,
                    is_nullable,
                    delete_rule: constraint.delete_rule,
                });
            }
            None => self.unresolved.push(UnresolvedReference {
                child,
                parent_name: naming.effective_name(&parent_identity),
                constraint: constraint.name.clone(),
            }),
        }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn unresolved(&self) -> &[UnresolvedReference] {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, node: usize) -> &str {
        &self.nodes[node].name
    }

    /// Sorted, de-duplicated parents of each node, self loops excluded
    pub fn adjacency(&self) -> Vec<Vec<usize>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for edge in self.edges.iter().filter(|e| e.child != e.parent) {
            adjacency[edge.child].push(edge.parent);
        }
        for parents in &mut adjacency {
            parents.sort_unstable();
            parents.dedup();
        }
        adjacency
    }

    /// Strongly connected components with more than one node, each sorted by
    /// position, ordered by their first position.
    pub fn cyclic_components(&self) -> Vec<Vec<usize>> {
        let adjacency = self.adjacency();
        let mut components: Vec<Vec<usize>> = strongly_connected_components(&adjacency)
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|mut c| {
                c.sort_unstable();
                c
            })
            .collect();
        components.sort_by_key(|c| c[0]);
        components
    }

    /// Shortest closed walk from the lowest position in `component` back to
    /// itself, staying inside the component.
    pub fn cycle_path(&self, component: &[usize]) -> Vec<usize> {
        let Some(&start) = component.iter().min() else {
            return Vec::new();
        };
        let adjacency = self.adjacency();
        let members: HashSet<usize> = component.iter().copied().collect();
        let mut previous: HashMap<usize, usize> = HashMap::new();
        let mut seen: HashSet<usize> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for &next in &adjacency[node] {
                if !members.contains(&next) {
                    continue;
                }
                if next == start {
                    let mut path = vec![node];
                    let mut cursor = node;
                    while let Some(&p) = previous.get(&cursor) {
                        path.push(p);
                        cursor = p;
                    }
                    path.reverse();
                    path.push(start);
                    return path;
                }
                if seen.insert(next) {
                    previous.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        vec![start]
    }
}

/// Parent of a constraint: the referenced table when the model knows it,
/// then the relationship's target entity, then a bare table identity.
fn resolve_parent(
    model: &Model,
    entity: &EntityModel,
    relationship: &RelationshipModel,
    constraint: &ActualConstraint,
) -> EntityIdentity {
    let schema = if constraint.referenced_schema.is_empty() {
        entity.schema.as_str()
    } else {
        constraint.referenced_schema.as_str()
    };
    let table = if constraint.referenced_table.is_empty() {
        relationship.target_physical_name.as_str()
    } else {
        constraint.referenced_table.as_str()
    };

    model
        .find_table(schema, table)
        .or_else(|| model.find_entity(&relationship.target_entity))
        .map(EntityModel::identity)
        .unwrap_or_else(|| EntityIdentity::table(schema, table))
}

/// Iterative Kosaraju over an adjacency list
fn strongly_connected_components(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut visited = vec![false; n];
    let mut finished = Vec::with_capacity(n);

    for root in 0..n {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        let mut stack = vec![(root, 0usize)];
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            match adjacency[node].get(top.1) {
                Some(&next) => {
                    top.1 += 1;
                    if !visited[next] {
                        visited[next] = true;
                        stack.push((next, 0));
                    }
                }
                None => {
                    finished.push(node);
                    stack.pop();
                }
            }
        }
    }

    let mut reverse = vec![Vec::new(); n];
    for (node, parents) in adjacency.iter().enumerate() {
        for &parent in parents {
            reverse[parent].push(node);
        }
    }

    let mut assigned = vec![false; n];
    let mut components = Vec::new();
    for &root in finished.iter().rev() {
        if assigned[root] {
            continue;
        }
        assigned[root] = true;
        let mut component = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            component.push(node);
            for &next in &reverse[node] {
                if !assigned[next] {
                    assigned[next] = true;
                    stack.push(next);
                }
            }
        }
        components.push(component);
    }

    components
}
