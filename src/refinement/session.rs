// src/refinement/session.rs

use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use super::feedback::{Feedback, FeedbackSource, RejectionSummary};
use crate::config::{PuzzleConfig, SolverConfig};
use crate::embeddings::{EmbeddingProvider, EmbeddingStore, fetch_universe};
use crate::error::{Result, SolveError};
use crate::input::validate_item_count;
use crate::models::{ExclusionConstraint, Group, SimilarityMatrix};
use crate::optimization::{
    MilpSolver, PartitionModel, SolveStatus, SolverOutcome, build_partition_model, extract_groups,
    group_score,
};
use crate::results::RoundStats;
use crate::similarity::build_similarity_matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    Build,
    Solve,
    Extract,
    Propose,
    AwaitFeedback,
    ApplyAccept,
    ApplyReject,
    Done,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Build => "build",
            LoopState::Solve => "solve",
            LoopState::Extract => "extract",
            LoopState::Propose => "propose",
            LoopState::AwaitFeedback => "await_feedback",
            LoopState::ApplyAccept => "apply_accept",
            LoopState::ApplyReject => "apply_reject",
            LoopState::Done => "done",
        }
    }
}

/// Final result of a refinement run.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementOutcome {
    /// In confirmation order; the last one is the auto-derived leftover group
    pub confirmed: Vec<Group>,
    /// Distinct rejected groups, in first-rejection order
    pub rejected: Vec<Group>,
    /// Every reject decision, repeats included
    pub rejection_count: usize,
    pub rounds: Vec<RoundStats>,
}

/// Working state of the round in progress. Dropped on error and on feedback.
#[derive(Debug)]
struct Round {
    number: usize,
    active: Vec<String>,
    similarity: SimilarityMatrix,
    model: PartitionModel,
    outcome: Option<SolverOutcome>,
    solve_time: Duration,
    ranking: Vec<Group>,
    proposal: Option<Group>,
}

impl Round {
    fn exclusion_items(&self) -> Vec<Vec<String>> {
        self.model
            .exclusions
            .iter()
            .map(|e| e.indices.iter().map(|&i| self.active[i].clone()).collect())
            .collect()
    }

    fn proposal(&self) -> Result<&Group> {
        self.proposal
            .as_ref()
            .ok_or_else(|| SolveError::InvalidModel("no group has been proposed".into()))
    }

    fn stats(&self, feedback: Feedback) -> Result<RoundStats> {
        let outcome = self
            .outcome
            .as_ref()
            .ok_or_else(|| SolveError::InvalidModel("round has no solver outcome".into()))?;
        let proposal = self.proposal()?;
        Ok(RoundStats {
            round: self.number,
            active_items: self.active.len(),
            exclusions: self.model.exclusions.len(),
            status: outcome.status.as_str().to_string(),
            objective: outcome.objective,
            proposal: proposal.items.clone(),
            proposal_score: proposal.score,
            feedback: feedback.as_str().to_string(),
            solve_time: self.solve_time.as_secs_f64(),
        })
    }
}

/// Drives build -> solve -> extract -> propose -> feedback rounds until every
/// group is confirmed.
///
/// Confirmed and rejected groups are held by item text. Exclusion indices are
/// re-derived from them against the active items at the start of each round,
/// so acceptances that shrink the active set never leave stale indices behind.
/// Any error aborts the round in progress and returns the loop to `Build`
/// with confirmed and rejected state exactly as before the round.
pub struct RefinementLoop<S: MilpSolver> {
    solver: S,
    store: EmbeddingStore,
    universe: Vec<String>,
    puzzle: PuzzleConfig,
    solver_config: SolverConfig,

    state: LoopState,
    confirmed: Vec<Group>,
    rejected: Vec<Group>,
    rejection_count: usize,
    remaining_groups: usize,

    round: Option<Round>,
    rounds_started: usize,
    history: Vec<RoundStats>,
}

impl<S: MilpSolver> RefinementLoop<S> {
    /// `universe` must hold exactly group_size x group_count distinct items,
    /// each with a vector in `store`.
    pub fn new(
        solver: S,
        store: EmbeddingStore,
        universe: Vec<String>,
        puzzle: PuzzleConfig,
        solver_config: SolverConfig,
    ) -> Result<Self> {
        puzzle.validate()?;
        validate_item_count(&universe, &puzzle)?;
        let mut seen = HashSet::with_capacity(universe.len());
        if let Some(dup) = universe.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(SolveError::DuplicateItem(dup.clone()));
        }
        store.ensure_covers(&universe)?;

        Ok(Self {
            solver,
            store,
            universe,
            puzzle,
            solver_config,
            state: LoopState::Build,
            confirmed: Vec::with_capacity(puzzle.group_count),
            rejected: Vec::new(),
            rejection_count: 0,
            remaining_groups: puzzle.group_count,
            round: None,
            rounds_started: 0,
            history: Vec::new(),
        })
    }

    /// Fetches embeddings for the whole universe once, then builds the loop.
    pub fn from_provider<P: EmbeddingProvider + ?Sized>(
        solver: S,
        provider: &P,
        universe: Vec<String>,
        puzzle: PuzzleConfig,
        solver_config: SolverConfig,
    ) -> Result<Self> {
        validate_item_count(&universe, &puzzle)?;
        let store = fetch_universe(provider, &universe)?;
        Self::new(solver, store, universe, puzzle, solver_config)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == LoopState::Done
    }

    pub fn confirmed(&self) -> &[Group] {
        &self.confirmed
    }

    pub fn rejected(&self) -> &[Group] {
        &self.rejected
    }

    pub fn rejection_count(&self) -> usize {
        self.rejection_count
    }

    pub fn remaining_groups(&self) -> usize {
        self.remaining_groups
    }

    pub fn rounds(&self) -> &[RoundStats] {
        &self.history
    }

    /// Ranked groups of the round in progress, best first.
    pub fn current_ranking(&self) -> &[Group] {
        self.round
            .as_ref()
            .map(|r| r.ranking.as_slice())
            .unwrap_or(&[])
    }

    pub fn current_proposal(&self) -> Option<&Group> {
        self.round.as_ref().and_then(|r| r.proposal.as_ref())
    }

    /// Universe minus confirmed items, in input order.
    pub fn active_items(&self) -> Vec<String> {
        let taken: HashSet<&str> = self
            .confirmed
            .iter()
            .flat_map(|g| g.items.iter().map(String::as_str))
            .collect();
        self.universe
            .iter()
            .filter(|t| !taken.contains(t.as_str()))
            .cloned()
            .collect()
    }

    /// Rejected groups as exclusion constraints over `active`. Sets with fewer
    /// than a full group of members still active can never bind and are dropped.
    pub fn exclusions_for(&self, active: &[String]) -> Vec<ExclusionConstraint> {
        let position: HashMap<&str, usize> = active
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        self.rejected
            .iter()
            .filter_map(|group| {
                let exclusion = ExclusionConstraint::new(
                    group
                        .items
                        .iter()
                        .filter_map(|t| position.get(t.as_str()).copied()),
                    self.puzzle.group_size,
                );
                if exclusion.can_bind() {
                    Some(exclusion)
                } else {
                    debug!(
                        "Dropping exclusion [{}]: only {} members still active",
                        group.items.join(", "),
                        exclusion.indices.len()
                    );
                    None
                }
            })
            .collect()
    }

    /// Advances the state machine by one transition and returns the new state.
    pub fn step<F: FeedbackSource + ?Sized>(&mut self, source: &mut F) -> Result<LoopState> {
        match self.advance(source) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!("Round aborted in state '{}': {}", self.state.as_str(), e);
                self.round = None;
                self.state = LoopState::Build;
                Err(e)
            }
        }
    }

    /// Steps until `Done`. Stops at the first error; the loop can be resumed
    /// afterwards from `Build`.
    pub fn run<F: FeedbackSource + ?Sized>(&mut self, source: &mut F) -> Result<RefinementOutcome> {
        while self.step(source)? != LoopState::Done {}
        Ok(self.outcome())
    }

    pub fn outcome(&self) -> RefinementOutcome {
        RefinementOutcome {
            confirmed: self.confirmed.clone(),
            rejected: self.rejected.clone(),
            rejection_count: self.rejection_count,
            rounds: self.history.clone(),
        }
    }

    fn advance<F: FeedbackSource + ?Sized>(&mut self, source: &mut F) -> Result<LoopState> {
        self.state = match self.state {
            LoopState::Build => self.build()?,
            LoopState::Solve => self.solve()?,
            LoopState::Extract => self.extract()?,
            LoopState::Propose => self.propose()?,
            LoopState::AwaitFeedback => self.await_feedback(source)?,
            LoopState::ApplyAccept => self.apply_accept()?,
            LoopState::ApplyReject => self.apply_reject(source)?,
            LoopState::Done => LoopState::Done,
        };
        Ok(self.state)
    }

    fn round_mut(&mut self) -> Result<&mut Round> {
        self.round
            .as_mut()
            .ok_or_else(|| SolveError::InvalidModel("no round in progress".into()))
    }

    fn build(&mut self) -> Result<LoopState> {
        let active = self.active_items();
        if self.remaining_groups <= 1 {
            self.confirm_leftover(&active)?;
            return Ok(LoopState::Done);
        }

        let similarity = build_similarity_matrix(&active, &self.store)?;
        let exclusions = self.exclusions_for(&active);
        let model = build_partition_model(
            &similarity,
            &exclusions,
            self.puzzle.group_size,
            self.remaining_groups,
        )?;

        self.rounds_started += 1;
        info!(
            "Round {}: {} active items, {} groups to find, {} exclusions",
            self.rounds_started,
            active.len(),
            self.remaining_groups,
            exclusions.len()
        );
        debug!("shape of similarity matrix: ({}, {})", similarity.size(), similarity.size());

        self.round = Some(Round {
            number: self.rounds_started,
            active,
            similarity,
            model,
            outcome: None,
            solve_time: Duration::ZERO,
            ranking: Vec::new(),
            proposal: None,
        });
        Ok(LoopState::Solve)
    }

    fn solve(&mut self) -> Result<LoopState> {
        let round = self
            .round
            .as_mut()
            .ok_or_else(|| SolveError::InvalidModel("no round in progress".into()))?;
        debug!("Re-indexed exclusions: {:?}", round.exclusion_items());

        let start = Instant::now();
        let outcome = self.solver.solve(&round.model, &self.solver_config)?;
        round.solve_time = start.elapsed();

        match &outcome.status {
            SolveStatus::Optimal => {}
            SolveStatus::StoppedFeasible => warn!(
                "Solver stopped early; continuing with the best assignment found (objective {:.4})",
                outcome.objective
            ),
            SolveStatus::Infeasible => {
                return Err(SolveError::InfeasibleModel {
                    exclusions: round.exclusion_items(),
                });
            }
            SolveStatus::Error(message) => return Err(SolveError::Solver(message.clone())),
        }
        info!(
            "Objective value: {:.4} (status '{}', {:.2?})",
            outcome.objective,
            outcome.status.as_str(),
            round.solve_time
        );
        round.outcome = Some(outcome);
        Ok(LoopState::Extract)
    }

    fn extract(&mut self) -> Result<LoopState> {
        let group_size = self.puzzle.group_size;
        let tolerance = self.solver_config.rounding_tolerance;
        let round = self.round_mut()?;
        let outcome = round
            .outcome
            .as_ref()
            .ok_or_else(|| SolveError::InvalidModel("round has no solver outcome".into()))?;

        let ranked = extract_groups(
            &outcome.values,
            &round.similarity,
            round.model.group_count,
            group_size,
            tolerance,
        )?;
        let ranking = ranked
            .iter()
            .map(|g| {
                Group::new(
                    g.members.iter().map(|&i| round.active[i].clone()).collect(),
                    g.score,
                )
            })
            .collect();
        round.ranking = ranking;
        Ok(LoopState::Propose)
    }

    fn propose(&mut self) -> Result<LoopState> {
        let round = self.round_mut()?;
        let top = round
            .ranking
            .first()
            .cloned()
            .ok_or_else(|| SolveError::InvalidPartition("solver returned no groups".into()))?;
        info!(
            "Proposing [{}] with score {:.4}",
            top.items.join(", "),
            top.score
        );
        round.proposal = Some(top);
        Ok(LoopState::AwaitFeedback)
    }

    fn await_feedback<F: FeedbackSource + ?Sized>(&mut self, source: &mut F) -> Result<LoopState> {
        let round = self.round_mut()?;
        let feedback = source.propose(round.proposal()?, &round.ranking)?;
        debug!("Round {} feedback: {}", round.number, feedback.as_str());
        Ok(match feedback {
            Feedback::Accept => LoopState::ApplyAccept,
            Feedback::Reject => LoopState::ApplyReject,
        })
    }

    fn apply_accept(&mut self) -> Result<LoopState> {
        let round = self
            .round
            .as_ref()
            .ok_or_else(|| SolveError::InvalidModel("no round in progress".into()))?;
        let stats = round.stats(Feedback::Accept)?;
        let accepted = round.proposal()?.clone();

        // the leftover group is scored before anything is mutated
        let leftover = if self.remaining_groups - 1 == 1 {
            let rest: Vec<String> = round
                .active
                .iter()
                .filter(|t| !accepted.contains(t.as_str()))
                .cloned()
                .collect();
            let score = self.score_items(&rest)?;
            Some(Group::new(rest, score))
        } else {
            None
        };

        info!("Confirmed [{}]", accepted.items.join(", "));
        self.round = None;
        self.history.push(stats);
        self.confirmed.push(accepted);
        self.remaining_groups -= 1;

        match leftover {
            Some(group) => {
                info!("Auto-confirmed leftover group [{}]", group.items.join(", "));
                self.confirmed.push(group);
                self.remaining_groups = 0;
                Ok(LoopState::Done)
            }
            None => Ok(LoopState::Build),
        }
    }

    fn apply_reject<F: FeedbackSource + ?Sized>(&mut self, source: &mut F) -> Result<LoopState> {
        let round = self
            .round
            .take()
            .ok_or_else(|| SolveError::InvalidModel("no round in progress".into()))?;
        let stats = round.stats(Feedback::Reject)?;
        let rejected = round.proposal()?.clone();

        self.rejection_count += 1;
        if self.rejected.iter().any(|g| g.same_items(&rejected)) {
            debug!(
                "[{}] was already rejected; no new exclusion added",
                rejected.items.join(", ")
            );
        } else {
            self.rejected.push(rejected);
        }
        self.history.push(stats);
        info!(
            "Rejection {} recorded; {} distinct rejected groups",
            self.rejection_count,
            self.rejected.len()
        );

        source.rejected(&RejectionSummary {
            confirmed: &self.confirmed,
            rejected: &self.rejected,
            rejection_count: self.rejection_count,
            remaining_groups: self.remaining_groups,
        })?;
        Ok(LoopState::Build)
    }

    fn confirm_leftover(&mut self, active: &[String]) -> Result<()> {
        if !active.is_empty() {
            let score = self.score_items(active)?;
            info!("Auto-confirmed leftover group [{}]", active.join(", "));
            self.confirmed.push(Group::new(active.to_vec(), score));
        }
        self.remaining_groups = 0;
        Ok(())
    }

    fn score_items(&self, items: &[String]) -> Result<f64> {
        let similarity = build_similarity_matrix(items, &self.store)?;
        let members: Vec<usize> = (0..items.len()).collect();
        Ok(group_score(&members, &similarity))
    }
}
