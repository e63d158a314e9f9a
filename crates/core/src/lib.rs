//! Wireup core data models.
//!
//! This crate defines the values, producers, and registration tables that the
//! execution engine resolves into a dependency graph.

#![warn(missing_docs)]

// Values and producers
mod value;
mod producer;

// Registration
mod registry;
mod aggregation;
mod error;

// Re-exports
pub use value::{Value, Aggregate};
pub use producer::{Producer, Args, Completion, Outcome};
pub use registry::{Registry, Declaration, DeclarationKind, AggregationMeta};
pub use aggregation::{AggregationIndex, AggregateGroup, AggregateMember};
pub use error::{RegistryError, AggregationError};
