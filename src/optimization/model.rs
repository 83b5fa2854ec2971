// src/optimization/model.rs

use log::debug;

use crate::error::{Result, SolveError};
use crate::models::{ExclusionConstraint, SimilarityMatrix};

/// Binary decision variable X[item, group].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarIndex {
    pub item: usize,
    pub group: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// C1: every item sits in exactly one group
    Assignment { item: usize },
    /// C2: every group holds exactly M items
    GroupSize { group: usize },
    /// C3: an excluded set is never fully co-assigned to one group
    Exclusion { exclusion: usize, group: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Equal,
    LessOrEqual,
}

/// `sum(vars) <sense> rhs`; every coefficient is 1.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub kind: ConstraintKind,
    pub vars: Vec<VarIndex>,
    pub sense: Sense,
    pub rhs: f64,
}

impl LinearConstraint {
    pub fn is_satisfied_by<F: Fn(VarIndex) -> f64>(&self, value: F) -> bool {
        let lhs: f64 = self.vars.iter().map(|&v| value(v)).sum();
        match self.sense {
            Sense::Equal => (lhs - self.rhs).abs() < 1e-6,
            Sense::LessOrEqual => lhs <= self.rhs + 1e-6,
        }
    }
}

/// Product term `weight * X[a] * X[b]` with `a != b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairTerm {
    pub a: VarIndex,
    pub b: VarIndex,
    pub weight: f64,
}

/// Maximization objective: the sum over groups of
/// `sum_{(i,j) ordered} X[i,g] * X[j,g] * sim(i,j)`.
///
/// With binary X the diagonal terms collapse to `sim(i,i) * X[i,g]` (kept in
/// `linear`) and each unordered off-diagonal pair appears once with weight
/// `2 * sim(i,j)`. A group's value is therefore its self-similarity sum plus
/// twice its distinct-pair similarity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuadraticObjective {
    pub linear: Vec<(VarIndex, f64)>,
    pub pairs: Vec<PairTerm>,
}

impl QuadraticObjective {
    pub fn evaluate<F: Fn(VarIndex) -> f64>(&self, value: F) -> f64 {
        let linear: f64 = self.linear.iter().map(|&(v, w)| w * value(v)).sum();
        let pairs: f64 = self
            .pairs
            .iter()
            .map(|t| t.weight * value(t.a) * value(t.b))
            .sum();
        linear + pairs
    }
}

/// Solver-independent description of one round's partition problem.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionModel {
    pub item_count: usize,
    pub group_count: usize,
    pub group_size: usize,
    pub exclusions: Vec<ExclusionConstraint>,
    pub constraints: Vec<LinearConstraint>,
    pub objective: QuadraticObjective,
}

impl PartitionModel {
    pub fn variable_count(&self) -> usize {
        self.item_count * self.group_count
    }

    /// Position of X[item, group] in a row-major item x group value vector.
    pub fn flat_index(&self, var: VarIndex) -> usize {
        var.item * self.group_count + var.group
    }

    pub fn variables(&self) -> impl Iterator<Item = VarIndex> + '_ {
        (0..self.item_count)
            .flat_map(move |item| (0..self.group_count).map(move |group| VarIndex { item, group }))
    }
}

/// Builds a fresh model from an immutable snapshot of the round: the
/// similarity over the active items and the exclusions re-indexed against them.
pub fn build_partition_model(
    similarity: &SimilarityMatrix,
    exclusions: &[ExclusionConstraint],
    group_size: usize,
    group_count: usize,
) -> Result<PartitionModel> {
    let n = similarity.size();
    if group_size == 0 || group_count == 0 {
        return Err(SolveError::InvalidModel(
            "group size and group count must be positive".into(),
        ));
    }
    if n != group_size * group_count {
        return Err(SolveError::InvalidModel(format!(
            "{} active items cannot form {} groups of {}",
            n, group_count, group_size
        )));
    }
    if let Some(bad) = exclusions
        .iter()
        .flat_map(|e| e.indices.iter())
        .find(|&&i| i >= n)
    {
        return Err(SolveError::InvalidModel(format!(
            "exclusion references item {} but only {} items are active",
            bad, n
        )));
    }

    let x = |item: usize, group: usize| VarIndex { item, group };
    let mut constraints =
        Vec::with_capacity(n + group_count + exclusions.len() * group_count);

    // C1
    for i in 0..n {
        constraints.push(LinearConstraint {
            kind: ConstraintKind::Assignment { item: i },
            vars: (0..group_count).map(|g| x(i, g)).collect(),
            sense: Sense::Equal,
            rhs: 1.0,
        });
    }

    // C2
    for g in 0..group_count {
        constraints.push(LinearConstraint {
            kind: ConstraintKind::GroupSize { group: g },
            vars: (0..n).map(|i| x(i, g)).collect(),
            sense: Sense::Equal,
            rhs: group_size as f64,
        });
    }

    // C3
    for (e, exclusion) in exclusions.iter().enumerate() {
        for g in 0..group_count {
            constraints.push(LinearConstraint {
                kind: ConstraintKind::Exclusion {
                    exclusion: e,
                    group: g,
                },
                vars: exclusion.indices.iter().map(|&i| x(i, g)).collect(),
                sense: Sense::LessOrEqual,
                rhs: exclusion.max_together as f64,
            });
        }
    }

    let mut objective = QuadraticObjective {
        linear: Vec::with_capacity(n * group_count),
        pairs: Vec::with_capacity(n * n.saturating_sub(1) / 2 * group_count),
    };
    for g in 0..group_count {
        for i in 0..n {
            objective.linear.push((x(i, g), similarity.get(i, i)));
            for j in (i + 1)..n {
                objective.pairs.push(PairTerm {
                    a: x(i, g),
                    b: x(j, g),
                    weight: similarity.get(i, j) + similarity.get(j, i),
                });
            }
        }
    }

    debug!(
        "Built partition model: {} variables, {} constraints ({} exclusions), {} pair terms",
        n * group_count,
        constraints.len(),
        exclusions.len(),
        objective.pairs.len()
    );

    Ok(PartitionModel {
        item_count: n,
        group_count,
        group_size,
        exclusions: exclusions.to_vec(),
        constraints,
        objective,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_item_sims() -> SimilarityMatrix {
        SimilarityMatrix::from_rows(vec![
            vec![1.0, 0.9, 0.1, 0.1],
            vec![0.9, 1.0, 0.1, 0.1],
            vec![0.1, 0.1, 1.0, 0.9],
            vec![0.1, 0.1, 0.9, 1.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_constraint_counts() {
        let exclusions = vec![ExclusionConstraint::new(vec![0, 1], 2)];
        let model = build_partition_model(&four_item_sims(), &exclusions, 2, 2).unwrap();

        let count = |pred: fn(&ConstraintKind) -> bool| {
            model.constraints.iter().filter(|c| pred(&c.kind)).count()
        };
        assert_eq!(count(|k| matches!(k, ConstraintKind::Assignment { .. })), 4);
        assert_eq!(count(|k| matches!(k, ConstraintKind::GroupSize { .. })), 2);
        assert_eq!(count(|k| matches!(k, ConstraintKind::Exclusion { .. })), 2);
        assert_eq!(model.variable_count(), 8);

        let exclusion = model
            .constraints
            .iter()
            .find(|c| matches!(c.kind, ConstraintKind::Exclusion { group: 1, .. }))
            .unwrap();
        assert_eq!(exclusion.sense, Sense::LessOrEqual);
        assert_eq!(exclusion.rhs, 1.0);
        assert_eq!(
            exclusion.vars,
            vec![VarIndex { item: 0, group: 1 }, VarIndex { item: 1, group: 1 }]
        );
    }

    #[test]
    fn test_objective_keeps_self_terms_and_doubles_pairs() {
        let model = build_partition_model(&four_item_sims(), &[], 2, 2).unwrap();
        // {a,b} in group 0, {c,d} in group 1
        let value = |v: VarIndex| if (v.item < 2) == (v.group == 0) { 1.0 } else { 0.0 };
        let objective = model.objective.evaluate(value);
        // each group: 1 + 1 + 2 * 0.9
        assert!((objective - 7.6).abs() < 1e-12);

        // {a,c} and {b,d}: each group 2 + 2 * 0.1
        let mixed = |v: VarIndex| if (v.item % 2 == 0) == (v.group == 0) { 1.0 } else { 0.0 };
        assert!((model.objective.evaluate(mixed) - 4.4).abs() < 1e-12);
    }

    #[test]
    fn test_exclusion_is_violated_only_by_full_coassignment() {
        let exclusions = vec![ExclusionConstraint::new(vec![0, 1], 2)];
        let model = build_partition_model(&four_item_sims(), &exclusions, 2, 2).unwrap();
        let together = |v: VarIndex| if (v.item < 2) == (v.group == 0) { 1.0 } else { 0.0 };
        let apart = |v: VarIndex| if (v.item % 2 == 0) == (v.group == 0) { 1.0 } else { 0.0 };

        let c3: Vec<_> = model
            .constraints
            .iter()
            .filter(|c| matches!(c.kind, ConstraintKind::Exclusion { .. }))
            .collect();
        assert!(c3.iter().any(|c| !c.is_satisfied_by(together)));
        assert!(c3.iter().all(|c| c.is_satisfied_by(apart)));
        assert!(model.constraints.iter().all(|c| c.is_satisfied_by(apart)));
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let result = build_partition_model(&four_item_sims(), &[], 3, 2);
        assert!(matches!(result, Err(SolveError::InvalidModel(_))));
    }

    #[test]
    fn test_out_of_range_exclusion_is_rejected() {
        let exclusions = vec![ExclusionConstraint::new(vec![0, 7], 2)];
        let result = build_partition_model(&four_item_sims(), &exclusions, 2, 2);
        assert!(matches!(result, Err(SolveError::InvalidModel(_))));
    }

    #[test]
    fn test_builder_is_pure() {
        let exclusions = vec![ExclusionConstraint::new(vec![2, 3], 2)];
        let first = build_partition_model(&four_item_sims(), &exclusions, 2, 2).unwrap();
        let second = build_partition_model(&four_item_sims(), &exclusions, 2, 2).unwrap();
        assert_eq!(first, second);
    }
}
