// src/optimization/mod.rs
pub mod extract;
pub mod model;
pub mod solver;

pub use extract::{extract_groups, group_score, round_assignment};
pub use model::{
    ConstraintKind, LinearConstraint, PairTerm, PartitionModel, QuadraticObjective, Sense, VarIndex,
    build_partition_model,
};
pub use solver::{GoodLpSolver, MilpSolver, SolveStatus, SolverOutcome};
