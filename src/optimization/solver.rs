// src/optimization/solver.rs

use good_lp::{
    Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable,
    constraint::{eq, leq},
    variable,
};
use log::{debug, info, warn};
use std::time::Instant;

use super::model::{PartitionModel, Sense};
use crate::config::SolverConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum SolveStatus {
    /// Proven optimal
    Optimal,
    /// A stopping criterion fired; the assignment is the best one found
    StoppedFeasible,
    /// No assignment satisfies the constraints
    Infeasible,
    Error(String),
}

impl SolveStatus {
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::StoppedFeasible)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::StoppedFeasible => "stopped-feasible",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Error(_) => "error",
        }
    }
}

/// What a solver returns for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub status: SolveStatus,
    /// Row-major item x group values; empty unless the status carries a solution
    pub values: Vec<f64>,
    pub objective: f64,
}

impl SolverOutcome {
    pub fn solved(status: SolveStatus, values: Vec<f64>, objective: f64) -> Self {
        Self {
            status,
            values,
            objective,
        }
    }

    pub fn infeasible() -> Self {
        Self {
            status: SolveStatus::Infeasible,
            values: Vec::new(),
            objective: 0.0,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SolveStatus::Error(message.into()),
            values: Vec::new(),
            objective: 0.0,
        }
    }
}

/// Black-box MILP solver seam. One blocking call per round.
pub trait MilpSolver {
    fn solve(&self, model: &PartitionModel, config: &SolverConfig) -> Result<SolverOutcome>;
}

/// `good_lp` adapter. The quadratic objective is linearized exactly for binary
/// X: each pair term gets a product variable Y in [0, 1] bounded from the side
/// its weight pushes it towards (Y <= X_a, Y <= X_b for positive weights,
/// Y >= X_a + X_b - 1 for negative ones).
#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpSolver;

impl GoodLpSolver {
    pub fn new() -> Self {
        Self
    }
}

impl MilpSolver for GoodLpSolver {
    fn solve(&self, model: &PartitionModel, config: &SolverConfig) -> Result<SolverOutcome> {
        let start = Instant::now();
        let mut vars = ProblemVariables::new();

        // Groups are interchangeable, so only partitions whose groups are
        // ordered by their lowest item are searched: item i never sits in a
        // group above i.
        let x: Vec<Variable> = model
            .variables()
            .map(|var| {
                if var.group > var.item {
                    vars.add(variable().binary().max(0.0))
                } else {
                    vars.add(variable().binary())
                }
            })
            .collect();

        let mut objective = Expression::with_capacity(model.objective.linear.len());
        for &(var, weight) in &model.objective.linear {
            objective.add_mul(weight, x[model.flat_index(var)]);
        }

        let mut linking = Vec::new();
        for term in &model.objective.pairs {
            if term.weight == 0.0 {
                continue;
            }
            let xa = x[model.flat_index(term.a)];
            let xb = x[model.flat_index(term.b)];
            let y = vars.add(variable().min(0.0).max(1.0));
            objective.add_mul(term.weight, y);

            if term.weight > 0.0 {
                linking.push(leq(y - xa, 0.0));
                linking.push(leq(y - xb, 0.0));
            } else {
                linking.push(leq(xa + xb - y, 1.0));
            }
        }

        let mut problem = backend::problem(vars, objective, config);

        for c in &model.constraints {
            let mut lhs = Expression::with_capacity(c.vars.len());
            for &var in &c.vars {
                lhs.add_mul(1.0, x[model.flat_index(var)]);
            }
            problem = match c.sense {
                Sense::Equal => problem.with(eq(lhs, c.rhs)),
                Sense::LessOrEqual => problem.with(leq(lhs, c.rhs)),
            };
        }
        let linking_count = linking.len();
        for c in linking {
            problem = problem.with(c);
        }
        debug!(
            "Submitting model with {} assignment variables, {} model constraints and {} linking constraints",
            x.len(),
            model.constraints.len(),
            linking_count
        );

        let outcome = match problem.solve() {
            Ok(solution) => {
                let values: Vec<f64> = x.iter().map(|&v| solution.value(v)).collect();
                let objective_value = model
                    .objective
                    .evaluate(|var| values[model.flat_index(var)]);
                SolverOutcome::solved(backend::status(config), values, objective_value)
            }
            Err(ResolutionError::Infeasible) => SolverOutcome::infeasible(),
            Err(e) => SolverOutcome::failed(e.to_string()),
        };

        info!(
            "Solver finished with status '{}' in {:.2?}",
            outcome.status.as_str(),
            start.elapsed()
        );
        Ok(outcome)
    }
}

#[cfg(not(feature = "highs"))]
mod backend {
    use super::*;
    use good_lp::solvers::microlp::{MicroLpProblem, microlp};

    pub fn problem(
        vars: ProblemVariables,
        objective: Expression,
        config: &SolverConfig,
    ) -> MicroLpProblem {
        if config.has_stall_limit() {
            warn!(
                "microlp backend has no node limit; ignoring stall limit of {} nodes",
                config.stall_nodes
            );
        }
        vars.maximise(objective).using(microlp)
    }

    /// microlp only returns once the search is exhausted.
    pub fn status(_config: &SolverConfig) -> SolveStatus {
        SolveStatus::Optimal
    }
}

#[cfg(feature = "highs")]
mod backend {
    use super::*;
    use good_lp::solvers::highs::{HighsProblem, highs};

    pub fn problem(
        vars: ProblemVariables,
        objective: Expression,
        config: &SolverConfig,
    ) -> HighsProblem {
        let problem = vars
            .maximise(objective)
            .using(highs)
            .set_verbose(config.log_interval > 0);
        if config.has_stall_limit() {
            problem.set_option("mip_max_stall_nodes", config.stall_nodes as i32)
        } else {
            problem
        }
    }

    /// The adapter cannot see whether HiGHS hit the stall limit, so any
    /// solve under a limit is reported as best-found rather than optimal.
    pub fn status(config: &SolverConfig) -> SolveStatus {
        if config.has_stall_limit() {
            SolveStatus::StoppedFeasible
        } else {
            SolveStatus::Optimal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExclusionConstraint, SimilarityMatrix};
    use crate::optimization::model::build_partition_model;

    fn four_item_sims() -> SimilarityMatrix {
        SimilarityMatrix::from_rows(vec![
            vec![1.0, 0.9, 0.1, 0.1],
            vec![0.9, 1.0, 0.1, 0.1],
            vec![0.1, 0.1, 1.0, 0.9],
            vec![0.1, 0.1, 0.9, 1.0],
        ])
        .unwrap()
    }

    fn value(outcome: &SolverOutcome, groups: usize, item: usize, group: usize) -> f64 {
        outcome.values[item * groups + group]
    }

    #[test]
    fn test_solves_obvious_pairs() {
        let model = build_partition_model(&four_item_sims(), &[], 2, 2).unwrap();
        let outcome = GoodLpSolver::new()
            .solve(&model, &SolverConfig::default())
            .unwrap();

        assert!(outcome.status.has_solution());
        assert!((outcome.objective - 7.6).abs() < 1e-6);
        // a with b, c with d, whichever columns they land in
        for g in 0..2 {
            assert!((value(&outcome, 2, 0, g) - value(&outcome, 2, 1, g)).abs() < 1e-6);
            assert!((value(&outcome, 2, 2, g) - value(&outcome, 2, 3, g)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_exclusion_forces_lower_score() {
        let exclusions = vec![ExclusionConstraint::new(vec![0, 1], 2)];
        let model = build_partition_model(&four_item_sims(), &exclusions, 2, 2).unwrap();
        let outcome = GoodLpSolver::new()
            .solve(&model, &SolverConfig::default())
            .unwrap();

        assert!(outcome.status.has_solution());
        assert!((outcome.objective - 4.4).abs() < 1e-6);
        for g in 0..2 {
            let together = value(&outcome, 2, 0, g) + value(&outcome, 2, 1, g);
            assert!(together < 1.5);
        }
    }

    #[test]
    fn test_negative_similarities_are_linearized() {
        let sims = SimilarityMatrix::from_rows(vec![
            vec![1.0, -0.8, 0.3, -0.2],
            vec![-0.8, 1.0, -0.1, 0.4],
            vec![0.3, -0.1, 1.0, -0.5],
            vec![-0.2, 0.4, -0.5, 1.0],
        ])
        .unwrap();
        let model = build_partition_model(&sims, &[], 2, 2).unwrap();
        let outcome = GoodLpSolver::new()
            .solve(&model, &SolverConfig::default())
            .unwrap();

        // best split is {0,2} {1,3}: 4 + 2 * (0.3 + 0.4)
        assert!((outcome.objective - 5.4).abs() < 1e-6);
    }

    #[test]
    fn test_contradictory_exclusions_are_infeasible() {
        // every possible pair containing item 0 is excluded
        let exclusions = vec![
            ExclusionConstraint::new(vec![0, 1], 2),
            ExclusionConstraint::new(vec![0, 2], 2),
            ExclusionConstraint::new(vec![0, 3], 2),
        ];
        let model = build_partition_model(&four_item_sims(), &exclusions, 2, 2).unwrap();
        let outcome = GoodLpSolver::new()
            .solve(&model, &SolverConfig::default())
            .unwrap();
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_empty());
    }
}
