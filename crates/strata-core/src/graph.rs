//! Dependency graph
//!
//! Edges are never declared: resource A depends on resource B whenever one of
//! A's inputs contains a reference to an output of B. The graph is validated
//! on construction (every reference resolves, no cycles) and carries a stable
//! topological order in which declaration order breaks ties.

use crate::error::{FlowError, Result};
use crate::model::Deployment;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Validated, acyclic dependency graph over node indices
///
/// For graphs built from a [`Deployment`], node `i` is the `i`-th declared
/// resource.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// `dependencies[a]` contains `b` when `a` must come after `b`
    dependencies: Vec<BTreeSet<usize>>,
    dependents: Vec<BTreeSet<usize>>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Derive the graph of a deployment from the references in its inputs.
    ///
    /// Output declarations are checked too: an output referencing an
    /// undeclared resource is a [`FlowError::MissingReference`].
    pub fn build(deployment: &Deployment) -> Result<Self> {
        let resources = deployment.resources();
        let mut dependencies = vec![BTreeSet::new(); resources.len()];

        for (i, resource) in resources.iter().enumerate() {
            for reference in resource.references() {
                let Some(j) = deployment.position(&reference.resource) else {
                    return Err(FlowError::MissingReference {
                        from: format!("resource '{}'", resource.id),
                        reference: reference.to_string(),
                        missing: reference.resource.clone(),
                    });
                };
                dependencies[i].insert(j);
            }
        }

        for output in deployment.outputs() {
            for reference in output.references() {
                if !deployment.contains(&reference.resource) {
                    return Err(FlowError::MissingReference {
                        from: format!("output '{}'", output.name),
                        reference: reference.to_string(),
                        missing: reference.resource.clone(),
                    });
                }
            }
        }

        let ids = resources.iter().map(|r| r.id.clone()).collect();
        let graph = Self::from_parts(ids, dependencies)?;
        tracing::debug!(
            "Built dependency graph for '{}': {} resources, {} edges",
            deployment.name,
            graph.len(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Build a graph from ids and the ids each one depends on.
    ///
    /// Dependencies on ids that are not part of `nodes` are ignored, which is
    /// what ordering persisted records needs: a recorded dependency may have
    /// been deleted already.
    pub fn from_adjacency<I, D>(nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, D)>,
        D: IntoIterator<Item = String>,
    {
        let (ids, deps): (Vec<String>, Vec<Vec<String>>) = nodes
            .into_iter()
            .map(|(id, deps)| (id, deps.into_iter().collect()))
            .unzip();

        let index: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let dependencies = deps
            .iter()
            .map(|d| {
                d.iter()
                    .filter_map(|id| index.get(id.as_str()).copied())
                    .collect()
            })
            .collect();

        Self::from_parts(ids, dependencies)
    }

    fn from_parts(ids: Vec<String>, dependencies: Vec<BTreeSet<usize>>) -> Result<Self> {
        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(FlowError::CircularDependency {
                members: cycle.into_iter().map(|i| ids[i].clone()).collect(),
            });
        }

        let mut dependents = vec![BTreeSet::new(); ids.len()];
        for (node, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].insert(node);
            }
        }

        let order = stable_order(&dependencies, &dependents);
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        Ok(Self {
            ids,
            index,
            dependencies,
            dependents,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.iter().map(BTreeSet::len).sum()
    }

    pub fn id(&self, node: usize) -> &str {
        &self.ids[node]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Nodes `node` depends on, ascending.
    pub fn dependencies(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.dependencies[node].iter().copied()
    }

    /// Nodes depending directly on `node`, ascending.
    pub fn dependents(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.dependents[node].iter().copied()
    }

    pub fn dependency_count(&self, node: usize) -> usize {
        self.dependencies[node].len()
    }

    /// `(dependent, dependency)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.dependencies
            .iter()
            .enumerate()
            .flat_map(|(node, deps)| deps.iter().map(move |&dep| (node, dep)))
    }

    /// Topological order, dependencies first.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn ordered_ids(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.ids[i].as_str()).collect()
    }

    /// Every node that depends on `node`, directly or not.
    pub fn transitive_dependents(&self, node: usize) -> BTreeSet<usize> {
        self.walk(node, &self.dependents)
    }

    /// Every node `node` depends on, directly or not.
    pub fn transitive_dependencies(&self, node: usize) -> BTreeSet<usize> {
        self.walk(node, &self.dependencies)
    }

    fn walk(&self, start: usize, edges: &[BTreeSet<usize>]) -> BTreeSet<usize> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<usize> = edges[start].iter().copied().collect();
        while let Some(next) = queue.pop_front() {
            if seen.insert(next) {
                queue.extend(edges[next].iter().copied());
            }
        }
        seen
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first search with a recursion-stack check.
///
/// Returns the members of the first cycle found, in dependency order,
/// starting from the node closest to the search root.
fn find_cycle(dependencies: &[BTreeSet<usize>]) -> Option<Vec<usize>> {
    let mut marks = vec![Mark::Unvisited; dependencies.len()];
    let mut path = Vec::new();

    for start in 0..dependencies.len() {
        if marks[start] == Mark::Unvisited
            && let Some(cycle) = visit(start, dependencies, &mut marks, &mut path)
        {
            return Some(cycle);
        }
    }
    None
}

fn visit(
    node: usize,
    dependencies: &[BTreeSet<usize>],
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    marks[node] = Mark::OnStack;
    path.push(node);

    for &next in &dependencies[node] {
        match marks[next] {
            Mark::OnStack => {
                let start = path.iter().position(|&n| n == next).unwrap_or(0);
                return Some(path[start..].to_vec());
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(next, dependencies, marks, path) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    path.pop();
    marks[node] = Mark::Done;
    None
}

/// Kahn's algorithm; the ready set is ordered by node index.
fn stable_order(dependencies: &[BTreeSet<usize>], dependents: &[BTreeSet<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(node, _)| node)
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &dependent in &dependents[node] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Output, Resource, ResourceKind, Value};

    fn network_stack() -> Deployment {
        // Declared dependents-first on purpose: order must come from references.
        Deployment::new("test")
            .with_resource(
                Resource::new(ResourceKind::Database, "db")
                    .with_input("subnet_id", Value::reference("subnet", "id"))
                    .with_input(
                        "security_group_ids",
                        Value::list([Value::reference("sg", "id")]),
                    ),
            )
            .unwrap()
            .with_resource(
                Resource::new(ResourceKind::Subnet, "subnet")
                    .with_input("vpc_id", Value::reference("vpc", "id")),
            )
            .unwrap()
            .with_resource(
                Resource::new(ResourceKind::SecurityGroup, "sg")
                    .with_input("vpc_id", Value::reference("vpc", "id")),
            )
            .unwrap()
            .with_resource(
                Resource::new(ResourceKind::Network, "vpc").with_input("cidr_block", "10.0.0.0/16"),
            )
            .unwrap()
    }

    fn position(graph: &DependencyGraph, id: &str) -> usize {
        graph.ordered_ids().iter().position(|i| *i == id).unwrap()
    }

    fn assert_valid_order(graph: &DependencyGraph) {
        let mut rank = vec![0; graph.len()];
        for (pos, &node) in graph.order().iter().enumerate() {
            rank[node] = pos;
        }
        assert_eq!(graph.order().len(), graph.len());
        for (dependent, dependency) in graph.edges() {
            assert!(
                rank[dependency] < rank[dependent],
                "{} must come before {}",
                graph.id(dependency),
                graph.id(dependent)
            );
        }
    }

    #[test]
    fn test_edges_are_derived_from_references() {
        let graph = DependencyGraph::build(&network_stack()).unwrap();
        assert_eq!(graph.edge_count(), 4);

        let db = graph.index_of("db").unwrap();
        let deps: Vec<&str> = graph.dependencies(db).map(|i| graph.id(i)).collect();
        assert_eq!(deps, vec!["subnet", "sg"]);
    }

    #[test]
    fn test_order_places_dependencies_first() {
        let graph = DependencyGraph::build(&network_stack()).unwrap();
        assert_valid_order(&graph);

        assert!(position(&graph, "vpc") < position(&graph, "subnet"));
        assert!(position(&graph, "vpc") < position(&graph, "sg"));
        assert!(position(&graph, "subnet") < position(&graph, "db"));
        assert!(position(&graph, "sg") < position(&graph, "db"));
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let graph = DependencyGraph::build(&network_stack()).unwrap();
        // subnet and sg only need vpc; subnet is declared first.
        assert_eq!(graph.ordered_ids(), vec!["vpc", "subnet", "sg", "db"]);
    }

    #[test]
    fn test_independent_resources_keep_declaration_order() {
        let mut deployment = Deployment::new("flat");
        for id in ["c", "a", "b"] {
            deployment
                .register(Resource::new(ResourceKind::Role, id))
                .unwrap();
        }
        let graph = DependencyGraph::build(&deployment).unwrap();
        assert_eq!(graph.ordered_ids(), vec!["c", "a", "b"]);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_two_node_cycle_names_both_members() {
        let deployment = Deployment::new("cycle")
            .with_resource(
                Resource::new(ResourceKind::Role, "a").with_input("x", Value::reference("b", "id")),
            )
            .unwrap()
            .with_resource(
                Resource::new(ResourceKind::Role, "b").with_input("y", Value::reference("a", "id")),
            )
            .unwrap();

        let err = DependencyGraph::build(&deployment).unwrap_err();
        let members = err.cycle_members().expect("cycle error");
        assert_eq!(members, ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_cycle_excludes_nodes_leading_into_it() {
        let deployment = Deployment::new("cycle")
            .with_resource(
                Resource::new(ResourceKind::Role, "entry")
                    .with_input("x", Value::reference("a", "id")),
            )
            .unwrap()
            .with_resource(
                Resource::new(ResourceKind::Role, "a").with_input("x", Value::reference("b", "id")),
            )
            .unwrap()
            .with_resource(
                Resource::new(ResourceKind::Role, "b").with_input("x", Value::reference("c", "id")),
            )
            .unwrap()
            .with_resource(
                Resource::new(ResourceKind::Role, "c").with_input("x", Value::reference("a", "id")),
            )
            .unwrap();

        let err = DependencyGraph::build(&deployment).unwrap_err();
        assert_eq!(
            err.cycle_members().unwrap(),
            ["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let deployment = Deployment::new("self")
            .with_resource(
                Resource::new(ResourceKind::Role, "a")
                    .with_input("x", Value::reference("a", "arn")),
            )
            .unwrap();

        let err = DependencyGraph::build(&deployment).unwrap_err();
        assert_eq!(err.cycle_members().unwrap(), ["a".to_string()]);
    }

    #[test]
    fn test_missing_reference_names_the_missing_id() {
        let deployment = Deployment::new("missing")
            .with_resource(
                Resource::new(ResourceKind::Subnet, "subnet")
                    .with_input("vpc_id", Value::reference("vpc", "id")),
            )
            .unwrap();

        let err = DependencyGraph::build(&deployment).unwrap_err();
        assert_eq!(err.missing_resource(), Some("vpc"));
        assert!(err.to_string().contains("resource 'subnet'"));
    }

    #[test]
    fn test_missing_reference_in_output() {
        let deployment = Deployment::new("missing")
            .with_resource(Resource::new(ResourceKind::Network, "vpc"))
            .unwrap()
            .with_output(Output::new("endpoint", Value::reference("db", "endpoint")))
            .unwrap();

        let err = DependencyGraph::build(&deployment).unwrap_err();
        assert_eq!(err.missing_resource(), Some("db"));
        assert!(err.to_string().contains("output 'endpoint'"));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = DependencyGraph::build(&network_stack()).unwrap();
        let vpc = graph.index_of("vpc").unwrap();
        let subnet = graph.index_of("subnet").unwrap();

        let mut below: Vec<&str> = graph
            .transitive_dependents(vpc)
            .into_iter()
            .map(|i| graph.id(i))
            .collect();
        below.sort();
        assert_eq!(below, vec!["db", "sg", "subnet"]);

        let above: Vec<&str> = graph
            .transitive_dependencies(graph.index_of("db").unwrap())
            .into_iter()
            .map(|i| graph.id(i))
            .collect();
        assert_eq!(above.len(), 3);
        assert!(graph.transitive_dependents(subnet).contains(&graph.index_of("db").unwrap()));
    }

    #[test]
    fn test_from_adjacency_ignores_unknown_dependencies() {
        let graph = DependencyGraph::from_adjacency([
            ("subnet".to_string(), vec!["vpc".to_string()]),
            ("vpc".to_string(), vec![]),
            ("db".to_string(), vec!["subnet".to_string(), "gone".to_string()]),
        ])
        .unwrap();

        assert_eq!(graph.ordered_ids(), vec!["vpc", "subnet", "db"]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_generated_chains_and_fans_have_valid_orders() {
        // Every node i depends on the nodes i/2 and i/3 (when distinct).
        for size in 1..40 {
            let mut deployment = Deployment::new("generated");
            for i in (0..size).rev() {
                let mut resource = Resource::new(ResourceKind::Role, format!("r{}", i));
                if i > 0 {
                    resource.set_input("half", Value::reference(format!("r{}", i / 2), "id"));
                    resource.set_input("third", Value::reference(format!("r{}", i / 3), "id"));
                }
                deployment.register(resource).unwrap();
            }
            let graph = DependencyGraph::build(&deployment).unwrap();
            assert_valid_order(&graph);
        }
    }
}
