// src/error.rs
use thiserror::Error;

/// Errors raised while preparing or running a refinement round.
///
/// Every variant is fatal for the round it occurs in. The refinement loop only
/// mutates its confirmed/rejected state after a round completes, so a caller
/// can retry after any of these.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("expected {expected} items (group size x group count) but got {actual}")]
    InputSizeMismatch { expected: usize, actual: usize },

    #[error("item '{0}' appears more than once in the input")]
    DuplicateItem(String),

    #[error("input contains an empty item")]
    EmptyItem,

    #[error("no usable embedding for item '{0}'")]
    EmbeddingMissing(String),

    #[error("embedding for '{item}' has dimension {actual}, expected {expected}")]
    EmbeddingDimensionMismatch {
        item: String,
        expected: usize,
        actual: usize,
    },

    #[error("embedding provider failed: {0:#}")]
    Provider(#[from] anyhow::Error),

    #[error("no partition satisfies the exclusion set {exclusions:?}")]
    InfeasibleModel { exclusions: Vec<Vec<String>> },

    #[error("solver value {value} for item {item} in group {group} is not close to 0 or 1")]
    AmbiguousRounding { item: usize, group: usize, value: f64 },

    #[error("extracted assignment is not a valid partition: {0}")]
    InvalidPartition(String),

    #[error("solver failed: {0}")]
    Solver(String),

    #[error("invalid model: {0}")]
    InvalidModel(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("feedback unavailable: {0}")]
    Feedback(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SolveError>;
