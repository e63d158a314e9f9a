//! The resolution tree: registration front end and resolve entry points.

use crate::scheduler::Scheduler;
use crate::{detect_cycles, Graph, ResolveConfig, ResolveError, Resolved, Result};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use wireup_core::{AggregationIndex, AggregationMeta, Args, Registry, RegistryError, Value};

/// A set of named constants and producers that can be resolved together.
///
/// ```text
/// register → resolve() → build graph → detect cycles → schedule → Resolved
/// ```
///
/// Every call to [`Tree::resolve`] builds a fresh graph and runs every
/// producer again.
#[derive(Debug, Default)]
pub struct Tree {
    registry: Registry,
    config: ResolveConfig,
}

impl Tree {
    /// Create an empty tree with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: ResolveConfig) -> Self {
        self.config = config;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    /// Mutable configuration, for overrides before resolving.
    pub fn config_mut(&mut self) -> &mut ResolveConfig {
        &mut self.config
    }

    /// Override the async deadline.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config.timeout = timeout;
    }

    /// Override the completion parameter name.
    pub fn set_done_name(&mut self, name: impl Into<String>) {
        self.config.done_name = name.into();
    }

    /// Register a constant.
    pub fn constant<T>(&mut self, name: impl Into<String>, value: T) -> std::result::Result<(), RegistryError>
    where
        T: std::any::Any + Send + Sync,
    {
        self.registry.register_constant(name, Value::new(value))
    }

    /// Register a producer.
    ///
    /// `dependencies` are bound positionally. Listing the completion
    /// parameter name makes the producer async.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        producer: F,
    ) -> std::result::Result<(), RegistryError>
    where
        F: Fn(Args) -> Value + Send + Sync + 'static,
    {
        self.registry
            .register_producer(name, dependencies, Arc::new(producer), None)
    }

    /// Register a producer that also contributes to an aggregate.
    pub fn register_aggregated<F>(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        aggregation: AggregationMeta,
        producer: F,
    ) -> std::result::Result<(), RegistryError>
    where
        F: Fn(Args) -> Value + Send + Sync + 'static,
    {
        self.registry
            .register_producer(name, dependencies, Arc::new(producer), Some(aggregation))
    }

    /// Whether a name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.is_registered(name)
    }

    /// Underlying registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mutable registry, for registering trait-object producers.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Build and validate the graph without running anything.
    pub fn plan(&self) -> Result<Plan> {
        debug!(declarations = self.registry.len(), "Building graph");
        let aggregation = AggregationIndex::build(&self.registry)?;
        let graph = Graph::build(&self.registry, &aggregation, &self.config.done_name)?;

        debug!(nodes = graph.len(), "Validating graph");
        detect_cycles(&graph)?;

        Ok(Plan {
            graph,
            config: self.config.clone(),
        })
    }

    /// Validate the tree and prepare a run.
    ///
    /// Validation errors are returned here, before any producer runs.
    /// Await the returned [`Resolution`] to execute.
    pub fn resolve(&self) -> Result<Resolution> {
        Ok(self.plan()?.into_resolution())
    }

    /// Callback form of [`Tree::resolve`].
    ///
    /// Validation errors are returned directly. Otherwise the run is spawned
    /// on the current Tokio runtime and `callback` receives its outcome
    /// exactly once.
    pub fn resolve_with<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Resolved>) + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()?;
        let resolution = self.resolve()?;
        handle.spawn(async move { callback(resolution.await) });
        Ok(())
    }
}

/// A validated graph plus the configuration it was built with.
#[derive(Debug)]
pub struct Plan {
    graph: Graph,
    config: ResolveConfig,
}

impl Plan {
    /// The validated graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Node names in an order that respects every dependency.
    pub fn order(&self) -> Vec<&str> {
        self.graph
            .topological_order()
            .into_iter()
            .map(|i| self.graph.node(i).name.as_str())
            .collect()
    }

    /// Turn the plan into a runnable resolution.
    pub fn into_resolution(self) -> Resolution {
        Resolution { plan: self }
    }
}

/// A validated run, ready to execute when awaited.
#[derive(Debug)]
pub struct Resolution {
    plan: Plan,
}

impl Resolution {
    /// Execute the run.
    pub async fn run(self) -> Result<Resolved> {
        let Plan { graph, config } = self.plan;
        info!(timeout = ?config.timeout, done_name = %config.done_name, "Starting resolution");
        Scheduler::new(&graph, config).run().await
    }
}

impl IntoFuture for Resolution {
    type Output = Result<Resolved>;
    type IntoFuture = Pin<Box<dyn Future<Output = Result<Resolved>> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}
