//! Resolution scheduling: dispatch, async completion, timeouts.

use crate::dependency::{Graph, NodeKind, Param};
use crate::{ResolveError, Result};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use wireup_core::{Aggregate, Args, Completion, Producer, Value};

/// Default name of the reserved completion parameter.
pub const DEFAULT_DONE_NAME: &str = "_done";

/// Default deadline for async producers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Per-run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveConfig {
    /// Dependency name that marks a producer as async
    pub done_name: String,
    /// Deadline for each async producer, from invocation
    pub timeout: Duration,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            done_name: DEFAULT_DONE_NAME.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ResolveConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the completion parameter name.
    pub fn with_done_name(mut self, name: impl Into<String>) -> Self {
        self.done_name = name.into();
        self
    }

    /// Set the async deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Values of a successful run, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    values: HashMap<String, Value>,
}

impl Resolved {
    /// Get a value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Get a value by name, typed.
    pub fn get_as<T: std::any::Any>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(Value::downcast_ref)
    }

    /// Whether a name was resolved.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of resolved names.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing was resolved.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Take the underlying map.
    pub fn into_inner(self) -> HashMap<String, Value> {
        self.values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    Pending,
    Running,
    Resolved,
    Failed,
}

/// Mutable state of one run. Only the scheduler loop writes to it.
struct ResolutionState {
    values: Vec<Option<Value>>,
    status: Vec<NodeStatus>,
    /// Unresolved dependency count per node
    waiting: Vec<usize>,
    in_flight: usize,
}

impl ResolutionState {
    fn new(graph: &Graph) -> Self {
        Self {
            values: vec![None; graph.len()],
            status: vec![NodeStatus::Pending; graph.len()],
            waiting: graph.nodes().iter().map(|n| n.dependencies.len()).collect(),
            in_flight: 0,
        }
    }

    fn initially_ready(&self) -> VecDeque<usize> {
        (0..self.waiting.len()).filter(|&i| self.waiting[i] == 0).collect()
    }

    fn value(&self, index: usize) -> Option<&Value> {
        self.values[index].as_ref()
    }

    /// Record a resolved node and queue dependents that became eligible.
    fn resolve(&mut self, graph: &Graph, index: usize, value: Value, ready: &mut VecDeque<usize>) {
        if self.status[index] == NodeStatus::Running {
            self.in_flight -= 1;
        }
        self.status[index] = NodeStatus::Resolved;
        self.values[index] = Some(value);

        for &dependent in graph.dependents(index) {
            self.waiting[dependent] -= 1;
            if self.waiting[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    /// Names of nodes that never resolved.
    fn unresolved(&self, graph: &Graph) -> Vec<String> {
        self.status
            .iter()
            .enumerate()
            .filter(|(_, status)| **status != NodeStatus::Resolved)
            .map(|(i, _)| graph.node(i).name.clone())
            .collect()
    }

    fn fail(&mut self, index: usize) {
        if self.status[index] == NodeStatus::Running {
            self.in_flight -= 1;
        }
        self.status[index] = NodeStatus::Failed;
    }

    fn into_resolved(self, graph: &Graph) -> Resolved {
        let values = graph
            .nodes()
            .iter()
            .zip(self.values)
            .filter_map(|(node, value)| value.map(|v| (node.name.clone(), v)))
            .collect();
        Resolved { values }
    }
}

/// How a dispatched node will finish.
enum Dispatch {
    /// Resolved without running user code
    Immediate(Value),
    /// Running as a task
    Spawned,
}

type TaskOutput = (usize, Result<Value>);

/// Walks a validated, acyclic graph and resolves every node.
///
/// Only reachable through [`crate::Resolution`], which validates first.
pub(crate) struct Scheduler<'a> {
    graph: &'a Graph,
    config: ResolveConfig,
}

impl<'a> Scheduler<'a> {
    /// Create a scheduler. The graph must already be validated.
    pub fn new(graph: &'a Graph, config: ResolveConfig) -> Self {
        Self { graph, config }
    }

    /// Run to completion or first failure.
    ///
    /// Every node is dispatched as soon as all its dependencies resolve.
    /// On the first failure the run returns immediately; tasks still in
    /// flight keep running but their results are discarded.
    pub async fn run(&self) -> Result<Resolved> {
        info!("Resolving {} nodes", self.graph.len());
        let started = Instant::now();

        let mut state = ResolutionState::new(self.graph);
        let mut ready = state.initially_ready();
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();

        loop {
            let mut failure = None;
            while let Some(index) = ready.pop_front() {
                match self.dispatch(index, &state, &mut tasks) {
                    Ok(Dispatch::Immediate(value)) => state.resolve(self.graph, index, value, &mut ready),
                    Ok(Dispatch::Spawned) => {
                        state.status[index] = NodeStatus::Running;
                        state.in_flight += 1;
                    }
                    Err(e) => {
                        state.fail(index);
                        failure = Some(e);
                        break;
                    }
                }
            }

            let outcome = if let Some(e) = failure {
                e
            } else {
                let Some(joined) = tasks.join_next().await else {
                    break;
                };
                match joined {
                    Ok((index, Ok(value))) => {
                        debug!(node = %self.graph.node(index).name, "Node resolved");
                        state.resolve(self.graph, index, value, &mut ready);
                        continue;
                    }
                    Ok((index, Err(e))) => {
                        state.fail(index);
                        e
                    }
                    Err(join_error) => ResolveError::Join(join_error),
                }
            };

            error!(
                error = %outcome,
                in_flight = state.in_flight,
                "Resolution failed"
            );
            tasks.detach_all();
            return Err(outcome);
        }

        let pending = state.unresolved(self.graph);
        if !pending.is_empty() {
            error!(?pending, "Resolution stalled");
            return Err(ResolveError::Stalled { pending });
        }

        info!(
            "Resolved {} nodes in {:?}",
            self.graph.len(),
            started.elapsed()
        );
        Ok(state.into_resolved(self.graph))
    }

    fn dispatch(
        &self,
        index: usize,
        state: &ResolutionState,
        tasks: &mut JoinSet<TaskOutput>,
    ) -> Result<Dispatch> {
        let node = self.graph.node(index);

        match &node.kind {
            NodeKind::Constant(value) => Ok(Dispatch::Immediate(value.clone())),
            NodeKind::Aggregate(members) => {
                let aggregate: Aggregate = members
                    .iter()
                    .filter_map(|(identifier, member)| {
                        state.value(*member).map(|v| (identifier.clone(), v.clone()))
                    })
                    .collect();
                Ok(Dispatch::Immediate(Value::new(aggregate)))
            }
            NodeKind::Producer(producer) => {
                let mut args = Args::new();
                let mut receiver = None;
                for param in &node.params {
                    match param {
                        Param::Node(dep) => {
                            let Some(value) = state.value(*dep) else {
                                return Err(ResolveError::UnresolvedArgument {
                                    producer: node.name.clone(),
                                    dependency: self.graph.node(*dep).name.clone(),
                                });
                            };
                            args.push(value.clone());
                        }
                        Param::Completion => {
                            let (completion, rx) = Completion::channel(node.name.clone());
                            args.push_completion(completion);
                            receiver = Some(rx);
                        }
                    }
                }

                let producer = Arc::clone(producer);
                let name = node.name.clone();
                debug!(node = %name, is_async = receiver.is_some(), "Dispatching node");

                match receiver {
                    None => {
                        tasks.spawn(async move { (index, invoke(&name, producer.as_ref(), args)) });
                    }
                    Some(rx) => {
                        let timeout = self.config.timeout;
                        tasks.spawn(async move {
                            // No deadline when it lies beyond the clock's range.
                            let deadline = Instant::now().checked_add(timeout);
                            if let Err(e) = invoke(&name, producer.as_ref(), args) {
                                return (index, Err(e));
                            }

                            // A dropped handle counts as never called.
                            let completion = async move {
                                match rx.await {
                                    Ok(outcome) => outcome,
                                    Err(_) => std::future::pending().await,
                                }
                            };
                            let completed = match deadline {
                                Some(deadline) => tokio::time::timeout_at(deadline, completion).await,
                                None => Ok(completion.await),
                            };

                            let result = match completed {
                                Ok(Ok(value)) => Ok(value),
                                Ok(Err(source)) => Err(ResolveError::Producer { producer: name, source }),
                                Err(_) => {
                                    warn!(node = %name, ?timeout, "Producer timed out");
                                    Err(ResolveError::Timeout { producer: name, timeout })
                                }
                            };
                            (index, result)
                        });
                    }
                }

                Ok(Dispatch::Spawned)
            }
        }
    }
}

/// Call user code, turning a panic into an error.
fn invoke(name: &str, producer: &dyn Producer, args: Args) -> Result<Value> {
    catch_unwind(AssertUnwindSafe(|| producer.invoke(args))).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        ResolveError::Panicked {
            producer: name.to_string(),
            message,
        }
    })
}
