// src/results.rs

use chrono::{NaiveDateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use uuid::Uuid;

use crate::config::PuzzleConfig;
use crate::error::Result;
use crate::models::Group;
use crate::refinement::RefinementOutcome;

/// Statistics for one solved-and-answered round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStats {
    pub round: usize,
    pub active_items: usize,
    /// Exclusion sets still able to bind after re-indexing
    pub exclusions: usize,
    pub status: String,
    pub objective: f64,
    pub proposal: Vec<String>,
    pub proposal_score: f64,
    /// "accept" or "reject"
    pub feedback: String,
    pub solve_time: f64,
}

/// Complete refinement run statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub run_timestamp: NaiveDateTime,
    pub description: Option<String>,

    pub group_size: usize,
    pub group_count: usize,
    pub total_items: usize,

    pub rounds: Vec<RoundStats>,
    pub confirmed_groups: Vec<Group>,
    pub rejected_groups: Vec<Group>,
    pub rejection_count: usize,

    pub embedding_time: f64,
    pub total_processing_time: f64,
}

impl RunReport {
    pub fn new(
        puzzle: &PuzzleConfig,
        outcome: &RefinementOutcome,
        embedding_time: f64,
        total_processing_time: f64,
    ) -> Self {
        let run_timestamp = Utc::now().naive_utc();
        Self {
            run_id: Uuid::new_v4().to_string(),
            run_timestamp,
            description: Some(format!(
                "Partition of {} items into {} groups of {}",
                puzzle.total_items(),
                puzzle.group_count,
                puzzle.group_size
            )),
            group_size: puzzle.group_size,
            group_count: puzzle.group_count,
            total_items: puzzle.total_items(),
            rounds: outcome.rounds.clone(),
            confirmed_groups: outcome.confirmed.clone(),
            rejected_groups: outcome.rejected.clone(),
            rejection_count: outcome.rejection_count,
            embedding_time,
            total_processing_time,
        }
    }

    pub fn solve_time(&self) -> f64 {
        self.rounds.iter().map(|r| r.solve_time).sum()
    }

    pub fn accepted_rounds(&self) -> usize {
        self.rounds.iter().filter(|r| r.feedback == "accept").count()
    }
}

pub fn print_report(report: &RunReport) {
    println!("\n========== CONNECTIONS REFINEMENT REPORT ==========");
    println!("Run ID: {}", report.run_id);
    println!("Timestamp: {}", report.run_timestamp);
    if let Some(desc) = &report.description {
        println!("Description: {}", desc);
    }

    println!("\n--- GENERAL STATISTICS ---");
    println!("Items partitioned: {}", report.total_items);
    println!("Rounds solved: {}", report.rounds.len());
    println!("Accepted proposals: {}", report.accepted_rounds());
    println!("Rejections: {}", report.rejection_count);
    println!("Distinct rejected groups: {}", report.rejected_groups.len());

    println!("\n--- TIMING INFORMATION ---");
    println!("Embedding time: {:.2} seconds", report.embedding_time);
    println!("Solver time: {:.2} seconds", report.solve_time());
    println!(
        "Total processing time: {:.2} seconds",
        report.total_processing_time
    );

    println!("\n--- ROUNDS ---");
    for round in &report.rounds {
        println!(
            "Round {}: {} active items, {} exclusions, status {}, objective {:.4}",
            round.round, round.active_items, round.exclusions, round.status, round.objective
        );
        println!(
            "  Proposed [{}] ({:.4}) -> {}",
            round.proposal.join(", "),
            round.proposal_score,
            round.feedback
        );
    }

    println!("\n--- CONFIRMED GROUPS ---");
    for (i, group) in report.confirmed_groups.iter().enumerate() {
        println!("{}. [{}] ({:.4})", i + 1, group.items.join(", "), group.score);
    }
    println!("\n==================================================");
}

/// Writes the report as pretty JSON.
pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), report).map_err(std::io::Error::from)?;
    info!("Run report {} written to {}", report.run_id, path.display());
    Ok(())
}
