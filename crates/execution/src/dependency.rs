//! Dependency graph construction.

use crate::{ResolveError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use wireup_core::{AggregationIndex, DeclarationKind, Producer, Registry, Value};

/// What a node does when it runs.
#[derive(Clone)]
pub enum NodeKind {
    /// Resolves immediately to a precomputed value
    Constant(Value),
    /// Invokes user code
    Producer(Arc<dyn Producer>),
    /// Collects member values: `(identifier, member node)`
    Aggregate(Vec<(String, usize)>),
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Producer(_) => f.write_str("Producer"),
            Self::Aggregate(members) => f.debug_tuple("Aggregate").field(members).finish(),
        }
    }
}

/// One positional parameter of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Bound to the value of another node
    Node(usize),
    /// Bound to the completion handle
    Completion,
}

/// A node in the dependency graph.
#[derive(Debug, Clone)]
pub struct Node {
    /// Registered name or aggregation key
    pub name: String,
    /// Behavior
    pub kind: NodeKind,
    /// Positional parameters, in declared order
    pub params: Vec<Param>,
    /// Distinct nodes this node waits on
    pub dependencies: Vec<usize>,
}

impl Node {
    /// Whether the node resolves through a completion handle.
    pub fn is_async(&self) -> bool {
        self.params.contains(&Param::Completion)
    }
}

/// A dependency graph.
///
/// Node indices follow registration order, with aggregate nodes appended.
#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    /// node -> [dependents]
    reverse: Vec<Vec<usize>>,
}

impl Graph {
    /// Build the graph, checking that every dependency name resolves.
    ///
    /// `done_name` is the reserved completion parameter; it is not a node.
    pub fn build(registry: &Registry, aggregation: &AggregationIndex, done_name: &str) -> Result<Self> {
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, declaration) in registry.iter().enumerate() {
            index.insert(declaration.name.clone(), i);
        }
        for (offset, group) in aggregation.groups().iter().enumerate() {
            index.insert(group.key().to_string(), registry.len() + offset);
        }

        let lookup = |producer: &str, name: &str| -> Result<usize> {
            index
                .get(name)
                .copied()
                .ok_or_else(|| ResolveError::UnregisteredDependency {
                    producer: producer.to_string(),
                    missing: name.to_string(),
                })
        };

        let mut nodes = Vec::with_capacity(index.len());

        for declaration in registry.iter() {
            let mut params = Vec::with_capacity(declaration.dependencies.len());
            for dependency in &declaration.dependencies {
                if dependency == done_name {
                    if params.contains(&Param::Completion) {
                        return Err(ResolveError::DuplicateCompletionParameter {
                            producer: declaration.name.clone(),
                            name: done_name.to_string(),
                        });
                    }
                    params.push(Param::Completion);
                } else {
                    params.push(Param::Node(lookup(&declaration.name, dependency)?));
                }
            }

            let kind = match &declaration.kind {
                DeclarationKind::Constant(value) => NodeKind::Constant(value.clone()),
                DeclarationKind::Producer(producer) => NodeKind::Producer(Arc::clone(producer)),
            };

            nodes.push(Node {
                name: declaration.name.clone(),
                kind,
                dependencies: distinct_nodes(&params),
                params,
            });
        }

        for group in aggregation.groups() {
            let mut members = Vec::with_capacity(group.members().len());
            let mut params = Vec::with_capacity(group.members().len());
            for member in group.members() {
                let node = lookup(group.key(), &member.name)?;
                members.push((member.identifier.clone(), node));
                params.push(Param::Node(node));
            }

            nodes.push(Node {
                name: group.key().to_string(),
                kind: NodeKind::Aggregate(members),
                dependencies: distinct_nodes(&params),
                params,
            });
        }

        let mut reverse = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for &dep in &node.dependencies {
                reverse[dep].push(i);
            }
        }

        Ok(Self { nodes, index, reverse })
    }

    /// Get a node by index.
    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    /// Get all nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Index of a node by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Nodes that depend on `index`, in ascending order.
    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.reverse[index]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get nodes in topological order (dependencies first).
    ///
    /// Ties are broken by node index. Nodes on a cycle are left out.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut waiting: Vec<usize> = self.nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut ready: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| waiting[i] == 0).collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(id) = ready.pop_front() {
            sorted.push(id);

            for &dependent in self.dependents(id) {
                waiting[dependent] -= 1;
                if waiting[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        sorted
    }
}

fn distinct_nodes(params: &[Param]) -> Vec<usize> {
    let mut nodes: Vec<usize> = params
        .iter()
        .filter_map(|p| match p {
            Param::Node(i) => Some(*i),
            Param::Completion => None,
        })
        .collect();
    nodes.sort_unstable();
    nodes.dedup();
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use wireup_core::{AggregationMeta, Args};

    fn producer() -> Arc<dyn Producer> {
        Arc::new(|_: Args| Value::unit())
    }

    fn build(registry: &Registry) -> Result<Graph> {
        let aggregation = AggregationIndex::build(registry)?;
        Graph::build(registry, &aggregation, "_done")
    }

    fn names(graph: &Graph, order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| graph.node(i).name.clone()).collect()
    }

    #[test]
    fn test_unregistered_dependency() {
        let mut registry = Registry::new();
        registry.register_producer("badDep", &["asdf"], producer(), None).unwrap();

        match build(&registry) {
            Err(ResolveError::UnregisteredDependency { producer, missing }) => {
                assert_eq!(producer, "badDep");
                assert_eq!(missing, "asdf");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_completion_parameter_is_not_a_node() {
        let mut registry = Registry::new();
        registry.register_constant("config", Value::unit()).unwrap();
        registry
            .register_producer("dep5", &["config", "_done"], producer(), None)
            .unwrap();

        let graph = build(&registry).unwrap();
        let node = graph.node(graph.index_of("dep5").unwrap());
        assert!(node.is_async());
        assert_eq!(node.params, vec![Param::Node(0), Param::Completion]);
        assert_eq!(node.dependencies, vec![0]);
    }

    #[test]
    fn test_custom_completion_name() {
        let mut registry = Registry::new();
        registry.register_producer("dep8", &["next"], producer(), None).unwrap();

        assert!(build(&registry).is_err());

        let aggregation = AggregationIndex::build(&registry).unwrap();
        let graph = Graph::build(&registry, &aggregation, "next").unwrap();
        assert!(graph.node(0).is_async());
    }

    #[test]
    fn test_duplicate_completion_parameter() {
        let mut registry = Registry::new();
        registry
            .register_producer("twice", &["_done", "_done"], producer(), None)
            .unwrap();

        assert!(matches!(
            build(&registry),
            Err(ResolveError::DuplicateCompletionParameter { .. })
        ));
    }

    #[test]
    fn test_repeated_dependency_keeps_positions() {
        let mut registry = Registry::new();
        registry.register_constant("a", Value::unit()).unwrap();
        registry.register_producer("pair", &["a", "a"], producer(), None).unwrap();

        let graph = build(&registry).unwrap();
        let node = graph.node(1);
        assert_eq!(node.params, vec![Param::Node(0), Param::Node(0)]);
        assert_eq!(node.dependencies, vec![0]);
        assert_eq!(graph.dependents(0), &[1]);
    }

    #[test]
    fn test_aggregate_node() {
        let mut registry = Registry::new();
        registry
            .register_producer("dep1", &[], producer(), Some(AggregationMeta::new("numbers", "one")))
            .unwrap();
        registry
            .register_producer("dep2", &[], producer(), Some(AggregationMeta::new("numbers", "two")))
            .unwrap();
        registry.register_producer("sum", &["numbers"], producer(), None).unwrap();

        let graph = build(&registry).unwrap();
        assert_eq!(graph.len(), 4);

        let numbers = graph.index_of("numbers").unwrap();
        assert_eq!(numbers, 3);
        match &graph.node(numbers).kind {
            NodeKind::Aggregate(members) => {
                assert_eq!(members, &vec![("one".to_string(), 0), ("two".to_string(), 1)]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(graph.node(2).dependencies, vec![numbers]);
    }

    #[test]
    fn test_topological_order() {
        let mut registry = Registry::new();
        registry.register_producer("dep4", &["dep3"], producer(), None).unwrap();
        registry
            .register_producer("dep3", &["dep2", "dep1", "stats"], producer(), None)
            .unwrap();
        registry.register_producer("dep2", &["config", "stats"], producer(), None).unwrap();
        registry.register_producer("dep1", &["config"], producer(), None).unwrap();
        registry.register_constant("config", Value::unit()).unwrap();
        registry.register_constant("stats", Value::unit()).unwrap();

        let graph = build(&registry).unwrap();
        let order = graph.topological_order();
        assert_eq!(
            names(&graph, &order),
            vec!["config", "stats", "dep1", "dep2", "dep3", "dep4"]
        );
    }

    #[test]
    fn test_empty_graph() {
        let graph = build(&Registry::new()).unwrap();
        assert!(graph.is_empty());
        assert!(graph.topological_order().is_empty());
    }
}
