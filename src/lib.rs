// src/lib.rs
pub mod config;
pub mod embeddings;
pub mod error;
pub mod input;
pub mod models;
pub mod optimization;
pub mod refinement;
pub mod results;
pub mod similarity;

// Re-export common types for easier access
pub use error::{Result, SolveError};
pub use models::{ExclusionConstraint, Group, Item, SimilarityMatrix};

// Re-export important functionality
pub use embeddings::{EmbeddingProvider, EmbeddingStore};
pub use optimization::{GoodLpSolver, MilpSolver};
pub use refinement::{FeedbackSource, RefinementLoop, RefinementOutcome};
