// src/input.rs

use std::collections::HashSet;

use crate::config::PuzzleConfig;
use crate::error::{Result, SolveError};

/// Normalizes one item: surrounding whitespace removed, lowercased.
pub fn normalize_item(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Splits a comma-separated list into normalized, unique items, in input order.
pub fn parse_items(line: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for raw in line.split(',') {
        let item = normalize_item(raw);
        if item.is_empty() {
            return Err(SolveError::EmptyItem);
        }
        if !seen.insert(item.clone()) {
            return Err(SolveError::DuplicateItem(item));
        }
        items.push(item);
    }
    Ok(items)
}

/// Aborts unless there are exactly group size x group count items.
pub fn validate_item_count(items: &[String], puzzle: &PuzzleConfig) -> Result<()> {
    let expected = puzzle.total_items();
    if items.len() != expected {
        return Err(SolveError::InputSizeMismatch {
            expected,
            actual: items.len(),
        });
    }
    Ok(())
}

/// Parses and validates a full puzzle line.
pub fn read_puzzle(line: &str, puzzle: &PuzzleConfig) -> Result<Vec<String>> {
    let items = parse_items(line)?;
    validate_item_count(&items, puzzle)?;
    Ok(items)
}

/// Parses an answer key: one comma-separated group per non-empty line.
pub fn parse_answer_key(contents: &str, puzzle: &PuzzleConfig) -> Result<Vec<Vec<String>>> {
    let groups = contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_items)
        .collect::<Result<Vec<_>>>()?;
    for group in &groups {
        if group.len() != puzzle.group_size {
            return Err(SolveError::InvalidConfig(format!(
                "answer group {:?} has {} items, expected {}",
                group,
                group.len(),
                puzzle.group_size
            )));
        }
    }
    if groups.len() != puzzle.group_count {
        return Err(SolveError::InvalidConfig(format!(
            "answer key has {} groups, expected {}",
            groups.len(),
            puzzle.group_count
        )));
    }
    Ok(groups)
}
