//! Registration-time and aggregation errors.

/// Errors raised while registering declarations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The name is already taken by a constant or a producer
    #[error("Name already registered: {0}")]
    DuplicateName(String),
}

/// Errors raised while grouping aggregated producers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregationError {
    /// An aggregation key is also a registered name
    #[error("Aggregation key `{0}` collides with a registered name")]
    KeyCollision(String),

    /// Two members of one group share an identifier
    #[error("Aggregation key `{key}` has identifier `{identifier}` more than once")]
    DuplicateIdentifier {
        /// Aggregation key
        key: String,
        /// Repeated identifier
        identifier: String,
    },
}
