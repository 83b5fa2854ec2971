// src/optimization/extract.rs

use log::debug;

use crate::error::{Result, SolveError};
use crate::models::{Assignment, RankedGroup, SimilarityMatrix};

/// Rounds one solver value: 1 at or above 0.5, else 0. Values further than
/// `tolerance` from both 0 and 1 mean the solve did not converge.
pub fn round_value(value: f64, tolerance: f64) -> Option<bool> {
    let rounded = value >= 0.5;
    let target = if rounded { 1.0 } else { 0.0 };
    if (value - target).abs() > tolerance {
        None
    } else {
        Some(rounded)
    }
}

/// Binarizes a row-major item x group value vector.
pub fn round_assignment(
    values: &[f64],
    item_count: usize,
    group_count: usize,
    tolerance: f64,
) -> Result<Assignment> {
    if values.len() != item_count * group_count {
        return Err(SolveError::InvalidPartition(format!(
            "expected {} solver values, got {}",
            item_count * group_count,
            values.len()
        )));
    }
    let mut cells = Vec::with_capacity(values.len());
    for (idx, &value) in values.iter().enumerate() {
        let bit = round_value(value, tolerance).ok_or(SolveError::AmbiguousRounding {
            item: idx / group_count,
            group: idx % group_count,
            value,
        })?;
        cells.push(bit);
    }
    Ok(Assignment::new(item_count, group_count, cells))
}

/// Intra-group score: sum of sim(i, j) over all ordered member pairs,
/// self-pairs included.
pub fn group_score(members: &[usize], similarity: &SimilarityMatrix) -> f64 {
    let mut score = 0.0;
    for &i in members {
        for &j in members {
            score += similarity.get(i, j);
        }
    }
    score
}

/// Turns a solver result into groups ranked by score, best first. Equal
/// scores keep solver column order.
pub fn extract_groups(
    values: &[f64],
    similarity: &SimilarityMatrix,
    group_count: usize,
    group_size: usize,
    tolerance: f64,
) -> Result<Vec<RankedGroup>> {
    let assignment = round_assignment(values, similarity.size(), group_count, tolerance)?;
    assignment.validate(group_size)?;

    let mut groups: Vec<RankedGroup> = (0..group_count)
        .map(|column| {
            let members = assignment.members(column);
            let score = group_score(&members, similarity);
            RankedGroup {
                column,
                members,
                score,
            }
        })
        .collect();

    // stable: ties stay in column order
    groups.sort_by(|a, b| b.score.total_cmp(&a.score));

    for (rank, group) in groups.iter().enumerate() {
        debug!(
            "{}: ({:8.2}) column {} members {:?}",
            rank, group.score, group.column, group.members
        );
    }
    Ok(groups)
}
