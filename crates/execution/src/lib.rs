//! Execution layer - graph construction, cycle detection, and scheduling.

#![warn(missing_docs)]

pub mod error;
pub mod dependency;
pub mod cycle;
pub mod scheduler;
pub mod tree;

pub use error::{ResolveError, Result};
pub use dependency::{Graph, Node, NodeKind, Param};
pub use cycle::detect_cycles;
pub use scheduler::{ResolveConfig, Resolved, DEFAULT_DONE_NAME, DEFAULT_TIMEOUT};
pub use tree::{Tree, Plan, Resolution};
