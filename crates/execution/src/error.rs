//! Resolution errors.

use std::time::Duration;
use wireup_core::AggregationError;

/// Error type for resolution runs.
///
/// Validation errors (`Aggregation`, `UnregisteredDependency`,
/// `DuplicateCompletionParameter`, `Cycle`) are returned before any producer
/// runs. The rest are reported by the run itself.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Invalid aggregation metadata
    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    /// A dependency name is neither registered nor the completion parameter
    #[error("Producer `{producer}` depends on unregistered name `{missing}`")]
    UnregisteredDependency {
        /// Declaring producer
        producer: String,
        /// Name that could not be found
        missing: String,
    },

    /// The completion parameter is listed more than once
    #[error("Producer `{producer}` lists the completion parameter `{name}` more than once")]
    DuplicateCompletionParameter {
        /// Declaring producer
        producer: String,
        /// Reserved parameter name
        name: String,
    },

    /// The graph contains a cycle
    #[error("Circular dependency: {}", path.join(" -> "))]
    Cycle {
        /// Names along the cycle; the first name is repeated at the end
        path: Vec<String>,
    },

    /// An async producer reported an error
    #[error("Producer `{producer}` failed: {source}")]
    Producer {
        /// Failing producer
        producer: String,
        /// Error reported through the completion handle
        source: anyhow::Error,
    },

    /// An async producer did not complete in time
    #[error("Producer `{producer}` did not complete within {timeout:?}")]
    Timeout {
        /// Producer that timed out
        producer: String,
        /// Configured deadline
        timeout: Duration,
    },

    /// A producer panicked
    #[error("Producer `{producer}` panicked: {message}")]
    Panicked {
        /// Panicking producer
        producer: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// A producer was dispatched before one of its arguments resolved
    #[error("Producer `{producer}` was dispatched before `{dependency}` resolved")]
    UnresolvedArgument {
        /// Dispatched producer
        producer: String,
        /// Dependency without a value
        dependency: String,
    },

    /// The run ended with nodes that could never become ready
    #[error("Resolution stalled with unresolved nodes: {}", pending.join(", "))]
    Stalled {
        /// Names of the unresolved nodes
        pending: Vec<String>,
    },

    /// A dispatched task could not be joined
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Callback-style resolution needs a Tokio runtime
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

impl ResolveError {
    /// Whether the error was raised during validation, before any producer ran.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Aggregation(_)
                | Self::UnregisteredDependency { .. }
                | Self::DuplicateCompletionParameter { .. }
                | Self::Cycle { .. }
        )
    }
}

/// Result type for resolution operations.
pub type Result<T> = std::result::Result<T, ResolveError>;
