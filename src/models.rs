// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Result, SolveError};

//------------------------------------------------------------------------------
// ITEMS
//------------------------------------------------------------------------------

/// A normalized puzzle item and its embedding vector.
///
/// Items are fetched once for the whole universe and never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub text: String,
    pub embedding: Vec<f32>,
}

impl Item {
    pub fn new(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            text: text.into(),
            embedding,
        }
    }
}

//------------------------------------------------------------------------------
// SIMILARITY
//------------------------------------------------------------------------------

/// Square, symmetric matrix of pairwise similarities over the active items.
///
/// Indices are round-local: index `i` refers to the i-th item of the active
/// set the matrix was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    size: usize,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Builds a matrix from explicit rows. Rows must form a square matrix.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let size = rows.len();
        let mut values = Vec::with_capacity(size * size);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != size {
                return Err(SolveError::InvalidModel(format!(
                    "similarity row {} has {} entries, expected {}",
                    i,
                    row.len(),
                    size
                )));
            }
            values.extend(row);
        }
        Ok(Self { size, values })
    }

    pub(crate) fn from_flat(size: usize, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), size * size);
        Self { size, values }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.size..(i + 1) * self.size]
    }
}

//------------------------------------------------------------------------------
// CONSTRAINTS
//------------------------------------------------------------------------------

/// A set of active-item indices that may not all land in one group.
///
/// `max_together` is the group size minus one: at most that many members of
/// the set may share a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExclusionConstraint {
    pub indices: Vec<usize>,
    pub max_together: usize,
}

impl ExclusionConstraint {
    pub fn new(indices: impl IntoIterator<Item = usize>, group_size: usize) -> Self {
        let indices: BTreeSet<usize> = indices.into_iter().collect();
        Self {
            indices: indices.into_iter().collect(),
            max_together: group_size.saturating_sub(1),
        }
    }

    /// A set smaller than a full group can never be fully co-assigned.
    pub fn can_bind(&self) -> bool {
        self.indices.len() > self.max_together
    }
}

//------------------------------------------------------------------------------
// ASSIGNMENT
//------------------------------------------------------------------------------

/// Binary item-to-group matrix produced by rounding a solver result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    items: usize,
    groups: usize,
    cells: Vec<bool>,
}

impl Assignment {
    pub fn new(items: usize, groups: usize, cells: Vec<bool>) -> Self {
        debug_assert_eq!(cells.len(), items * groups);
        Self {
            items,
            groups,
            cells,
        }
    }

    pub fn item_count(&self) -> usize {
        self.items
    }

    pub fn group_count(&self) -> usize {
        self.groups
    }

    pub fn is_assigned(&self, item: usize, group: usize) -> bool {
        self.cells[item * self.groups + group]
    }

    /// Active indices assigned to `group`, ascending.
    pub fn members(&self, group: usize) -> Vec<usize> {
        (0..self.items)
            .filter(|&i| self.is_assigned(i, group))
            .collect()
    }

    /// Checks that every item sits in exactly one group and every group holds
    /// exactly `group_size` items.
    pub fn validate(&self, group_size: usize) -> Result<()> {
        for i in 0..self.items {
            let count = (0..self.groups).filter(|&g| self.is_assigned(i, g)).count();
            if count != 1 {
                return Err(SolveError::InvalidPartition(format!(
                    "item {} is assigned to {} groups",
                    i, count
                )));
            }
        }
        for g in 0..self.groups {
            let count = (0..self.items).filter(|&i| self.is_assigned(i, g)).count();
            if count != group_size {
                return Err(SolveError::InvalidPartition(format!(
                    "group {} has {} items, expected {}",
                    g, count, group_size
                )));
            }
        }
        Ok(())
    }
}

//------------------------------------------------------------------------------
// GROUPS
//------------------------------------------------------------------------------

/// A group as found by one solve, in round-local indices.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedGroup {
    /// Solver column the group came from
    pub column: usize,
    /// Active item indices, ascending
    pub members: Vec<usize>,
    pub score: f64,
}

/// A group expressed by item identity, as proposed to or confirmed by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub items: Vec<String>,
    pub score: f64,
}

impl Group {
    pub fn new(items: Vec<String>, score: f64) -> Self {
        Self { items, score }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.iter().any(|i| i == item)
    }

    /// Order-independent identity of the group.
    pub fn key(&self) -> BTreeSet<&str> {
        self.items.iter().map(String::as_str).collect()
    }

    pub fn same_items(&self, other: &Group) -> bool {
        self.key() == other.key()
    }
}
