//! Insert-only table of named declarations.

use crate::{Producer, RegistryError, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Aggregation metadata attached to a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationMeta {
    /// Name of the synthetic aggregate node
    pub key: String,
    /// Key under which this producer's value appears in the aggregate
    pub identifier: String,
}

impl AggregationMeta {
    /// Create aggregation metadata.
    pub fn new(key: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            identifier: identifier.into(),
        }
    }
}

/// What a declaration yields.
#[derive(Clone)]
pub enum DeclarationKind {
    /// Precomputed value
    Constant(Value),
    /// Invocable producer
    Producer(Arc<dyn Producer>),
}

impl std::fmt::Debug for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant(value) => f.debug_tuple("Constant").field(value).finish(),
            Self::Producer(_) => f.write_str("Producer"),
        }
    }
}

/// A named declaration.
#[derive(Debug, Clone)]
pub struct Declaration {
    /// Unique name
    pub name: String,
    /// Dependency names, in positional order
    pub dependencies: Vec<String>,
    /// Constant value or producer
    pub kind: DeclarationKind,
    /// Aggregation metadata, if any
    pub aggregation: Option<AggregationMeta>,
}

impl Declaration {
    /// Whether this declaration is a constant.
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, DeclarationKind::Constant(_))
    }
}

/// Ordered collection of declarations keyed by name.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<Declaration>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constant.
    pub fn register_constant(
        &mut self,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), RegistryError> {
        self.insert(Declaration {
            name: name.into(),
            dependencies: Vec::new(),
            kind: DeclarationKind::Constant(value),
            aggregation: None,
        })
    }

    /// Register a producer with its dependency names.
    pub fn register_producer(
        &mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        producer: Arc<dyn Producer>,
        aggregation: Option<AggregationMeta>,
    ) -> Result<(), RegistryError> {
        self.insert(Declaration {
            name: name.into(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            kind: DeclarationKind::Producer(producer),
            aggregation,
        })
    }

    fn insert(&mut self, declaration: Declaration) -> Result<(), RegistryError> {
        if self.index.contains_key(&declaration.name) {
            return Err(RegistryError::DuplicateName(declaration.name));
        }

        debug!(
            name = %declaration.name,
            dependencies = ?declaration.dependencies,
            "Registered declaration"
        );

        self.index.insert(declaration.name.clone(), self.entries.len());
        self.entries.push(declaration);
        Ok(())
    }

    /// Whether a name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Look up a declaration by name.
    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Declarations in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.entries.iter()
    }

    /// Number of declarations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
