// tests/refinement_tests.rs

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};

use connections_lib::{
    config::{PuzzleConfig, SolverConfig},
    embeddings::{EmbeddingStore, StaticProvider},
    error::{Result, SolveError},
    models::{Group, Item},
    optimization::{GoodLpSolver, MilpSolver, PartitionModel, SolveStatus, SolverOutcome},
    refinement::{AnswerKeyFeedback, Feedback, LoopState, RefinementLoop, ScriptedFeedback},
};

// --- fixtures ---

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn key(group: &Group) -> BTreeSet<String> {
    group.items.iter().cloned().collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// sim(a,b) = 0.9, sim(c,d) = 0.9, every cross pair 0
fn pair_items() -> Vec<Item> {
    vec![
        Item::new("a", vec![1.0, 0.0, 0.0, 0.0]),
        Item::new("b", vec![0.9, 0.435_889_9, 0.0, 0.0]),
        Item::new("c", vec![0.0, 0.0, 1.0, 0.0]),
        Item::new("d", vec![0.0, 0.0, 0.9, 0.435_889_9]),
    ]
}

/// Same as `pair_items` but sim(a,b) = 0.95, so {a,b} strictly ranks first
fn skewed_pair_items() -> Vec<Item> {
    vec![
        Item::new("a", vec![1.0, 0.0, 0.0, 0.0]),
        Item::new("b", vec![0.95, 0.312_249_9, 0.0, 0.0]),
        Item::new("c", vec![0.0, 0.0, 1.0, 0.0]),
        Item::new("d", vec![0.0, 0.0, 0.9, 0.435_889_9]),
    ]
}

fn pair_loop(items: Vec<Item>) -> RefinementLoop<GoodLpSolver> {
    RefinementLoop::new(
        GoodLpSolver::new(),
        EmbeddingStore::from_items(items).unwrap(),
        words(&["a", "b", "c", "d"]),
        PuzzleConfig::new(2, 2).unwrap(),
        SolverConfig::default(),
    )
    .unwrap()
}

fn assert_partition(confirmed: &[Group], universe: &[String], group_size: usize) {
    let mut seen = BTreeSet::new();
    for group in confirmed {
        assert_eq!(group.len(), group_size, "group {:?} has the wrong size", group.items);
        for item in &group.items {
            assert!(seen.insert(item.clone()), "{} confirmed twice", item);
        }
    }
    let universe: BTreeSet<String> = universe.iter().cloned().collect();
    assert_eq!(seen, universe);
}

// --- canned solver ---

/// Returns queued outcomes in order and remembers every model it was given.
#[derive(Default)]
struct CannedSolver {
    outcomes: RefCell<VecDeque<SolverOutcome>>,
    models: RefCell<Vec<PartitionModel>>,
}

impl CannedSolver {
    fn new(outcomes: Vec<SolverOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            models: RefCell::new(Vec::new()),
        }
    }
}

impl MilpSolver for &CannedSolver {
    fn solve(&self, model: &PartitionModel, _config: &SolverConfig) -> Result<SolverOutcome> {
        self.models.borrow_mut().push(model.clone());
        self.outcomes
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| SolveError::Solver("no canned outcome left".into()))
    }
}

/// {a,b} in column 0, {c,d} in column 1
fn ab_cd_values() -> Vec<f64> {
    vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0]
}

fn canned_loop(solver: &CannedSolver) -> RefinementLoop<&CannedSolver> {
    RefinementLoop::new(
        solver,
        EmbeddingStore::from_items(pair_items()).unwrap(),
        words(&["a", "b", "c", "d"]),
        PuzzleConfig::new(2, 2).unwrap(),
        SolverConfig::default(),
    )
    .unwrap()
}

// --- end-to-end with the real solver ---

#[test]
fn test_accepting_top_group_auto_confirms_the_rest() {
    let mut session = pair_loop(pair_items());
    let mut script = ScriptedFeedback::new([Feedback::Accept]);

    let outcome = session.run(&mut script).unwrap();

    let first = key(&script.proposals()[0]);
    assert!(first == set(&["a", "b"]) || first == set(&["c", "d"]));
    assert_eq!(outcome.confirmed.len(), 2);
    assert_eq!(key(&outcome.confirmed[0]), first);
    assert_partition(&outcome.confirmed, &words(&["a", "b", "c", "d"]), 2);
    assert_eq!(outcome.rejection_count, 0);
    assert!(outcome.rejected.is_empty());
    assert_eq!(outcome.rounds.len(), 1);
    assert_eq!(session.remaining_groups(), 0);
    assert!(session.is_done());
}

#[test]
fn test_rejected_group_is_not_proposed_again() {
    let mut session = pair_loop(skewed_pair_items());
    let mut script = ScriptedFeedback::new([Feedback::Reject, Feedback::Accept]);

    let outcome = session.run(&mut script).unwrap();

    let proposals = script.proposals();
    assert_eq!(proposals.len(), 2);
    assert_eq!(key(&proposals[0]), set(&["a", "b"]));
    assert_ne!(key(&proposals[1]), set(&["a", "b"]));
    assert!(proposals[1].score < proposals[0].score);

    assert_eq!(outcome.rejection_count, 1);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(key(&outcome.rejected[0]), set(&["a", "b"]));
    assert!(outcome.confirmed.iter().all(|g| key(g) != set(&["a", "b"])));
    assert_partition(&outcome.confirmed, &words(&["a", "b", "c", "d"]), 2);

    assert_eq!(outcome.rounds[0].feedback, "reject");
    assert_eq!(outcome.rounds[1].exclusions, 1);
    assert_eq!(script.summaries(), 1);
}

#[test]
fn test_answer_key_run_shrinks_and_terminates() {
    // three embedding clusters of two, but the answer key crosses the a/b clusters
    let items = vec![
        Item::new("a1", vec![1.0, 0.0, 0.0, 0.1, 0.0, 0.0]),
        Item::new("a2", vec![1.0, 0.0, 0.0, 0.0, 0.1, 0.0]),
        Item::new("b1", vec![0.0, 1.0, 0.0, 0.1, 0.0, 0.0]),
        Item::new("b2", vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.1]),
        Item::new("c1", vec![0.0, 0.0, 1.0, 0.0, 0.1, 0.0]),
        Item::new("c2", vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.1]),
    ];
    let universe = words(&["a1", "a2", "b1", "b2", "c1", "c2"]);
    let answers = vec![
        words(&["a1", "b2"]),
        words(&["a2", "b1"]),
        words(&["c1", "c2"]),
    ];
    let puzzle = PuzzleConfig::new(2, 3).unwrap();

    let mut session = RefinementLoop::from_provider(
        GoodLpSolver::new(),
        &StaticProvider::new(items),
        universe.clone(),
        puzzle,
        SolverConfig::default(),
    )
    .unwrap();
    let mut feedback = AnswerKeyFeedback::new(answers.clone());

    let mut accepts = 0;
    let mut steps = 0;
    while !session.is_done() {
        let before = session.state();
        let after = session.step(&mut feedback).unwrap();
        if before == LoopState::ApplyAccept {
            accepts += 1;
            if after != LoopState::Done {
                assert_eq!(session.remaining_groups(), puzzle.group_count - accepts);
                assert_eq!(
                    session.active_items().len(),
                    (puzzle.group_count - accepts) * puzzle.group_size
                );
            }
        }
        steps += 1;
        assert!(steps < 500, "refinement did not terminate");
    }

    let outcome = session.outcome();
    assert_eq!(accepts, puzzle.group_count - 1);
    assert_partition(&outcome.confirmed, &universe, 2);
    let confirmed: BTreeSet<BTreeSet<String>> = outcome.confirmed.iter().map(key).collect();
    let expected: BTreeSet<BTreeSet<String>> = answers
        .iter()
        .map(|g| g.iter().cloned().collect())
        .collect();
    assert_eq!(confirmed, expected);

    // a pure a/b cluster always outranks the crossed pairs, so at least one rejection happens
    assert!(outcome.rejection_count >= 1);
    assert_eq!(feedback.decisions(), outcome.rounds.len());

    // no rejected set is ever proposed again
    for (i, round) in outcome.rounds.iter().enumerate() {
        if round.feedback != "reject" {
            continue;
        }
        let rejected: BTreeSet<&String> = round.proposal.iter().collect();
        for later in &outcome.rounds[i + 1..] {
            let proposal: BTreeSet<&String> = later.proposal.iter().collect();
            assert_ne!(proposal, rejected);
        }
    }
}

// --- failure paths with a canned solver ---

#[test]
fn test_stopped_feasible_result_is_used() {
    let solver = CannedSolver::new(vec![SolverOutcome::solved(
        SolveStatus::StoppedFeasible,
        ab_cd_values(),
        7.6,
    )]);
    let mut session = canned_loop(&solver);
    let mut script = ScriptedFeedback::new([Feedback::Accept]);

    let outcome = session.run(&mut script).unwrap();
    assert_eq!(outcome.rounds[0].status, "stopped-feasible");
    assert_eq!(key(&outcome.confirmed[0]), set(&["a", "b"]));
    assert_eq!(key(&outcome.confirmed[1]), set(&["c", "d"]));
}

#[test]
fn test_infeasible_round_reports_exclusions_and_keeps_state() {
    let solver = CannedSolver::new(vec![
        SolverOutcome::solved(SolveStatus::Optimal, ab_cd_values(), 7.6),
        SolverOutcome::infeasible(),
    ]);
    let mut session = canned_loop(&solver);
    let mut script = ScriptedFeedback::new([Feedback::Reject]);

    let err = session.run(&mut script).unwrap_err();
    match err {
        SolveError::InfeasibleModel { exclusions } => {
            assert_eq!(exclusions, vec![words(&["a", "b"])]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.state(), LoopState::Build);
    assert_eq!(session.rejection_count(), 1);
    assert_eq!(session.rejected().len(), 1);
    assert!(session.confirmed().is_empty());
    assert_eq!(session.remaining_groups(), 2);
    assert!(session.current_proposal().is_none());
}

#[test]
fn test_solver_error_is_fatal_for_the_round() {
    let solver = CannedSolver::new(vec![SolverOutcome::failed("license expired")]);
    let mut session = canned_loop(&solver);
    let mut script = ScriptedFeedback::default();

    let err = session.run(&mut script).unwrap_err();
    assert!(matches!(err, SolveError::Solver(m) if m == "license expired"));
    assert_eq!(session.state(), LoopState::Build);
    assert!(session.rounds().is_empty());
    assert!(script.proposals().is_empty());
}

#[test]
fn test_ambiguous_rounding_aborts_then_round_can_be_retried() {
    let mut fractional = ab_cd_values();
    fractional[0] = 0.6;
    fractional[1] = 0.4;
    let solver = CannedSolver::new(vec![
        SolverOutcome::solved(SolveStatus::Optimal, fractional, 7.0),
        SolverOutcome::solved(SolveStatus::Optimal, ab_cd_values(), 7.6),
    ]);
    let mut session = canned_loop(&solver);
    let mut script = ScriptedFeedback::new([Feedback::Accept]);

    let err = session.run(&mut script).unwrap_err();
    assert!(matches!(
        err,
        SolveError::AmbiguousRounding { item: 0, group: 0, .. }
    ));
    assert_eq!(session.state(), LoopState::Build);
    assert!(session.confirmed().is_empty());

    let outcome = session.run(&mut script).unwrap();
    assert_eq!(outcome.confirmed.len(), 2);
    assert_eq!(outcome.rounds.len(), 1);
    assert_eq!(outcome.rounds[0].round, 2);
}

#[test]
fn test_rejecting_same_group_twice_adds_one_exclusion() {
    let solver = CannedSolver::new(vec![
        SolverOutcome::solved(SolveStatus::Optimal, ab_cd_values(), 7.6),
        SolverOutcome::solved(SolveStatus::Optimal, ab_cd_values(), 7.6),
        SolverOutcome::solved(SolveStatus::Optimal, ab_cd_values(), 7.6),
    ]);
    let mut session = canned_loop(&solver);
    let mut script = ScriptedFeedback::new([Feedback::Reject, Feedback::Reject, Feedback::Accept]);

    let outcome = session.run(&mut script).unwrap();
    assert_eq!(outcome.rejection_count, 2);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(script.summaries(), 2);

    let models = solver.models.borrow();
    assert_eq!(models.len(), 3);
    assert_eq!(models[0].exclusions.len(), 0);
    assert_eq!(models[1].exclusions.len(), 1);
    assert_eq!(models[2].exclusions, models[1].exclusions);
    assert_eq!(models[2].constraints, models[1].constraints);
}

#[test]
fn test_proposal_follows_input_order() {
    let solver = CannedSolver::new(vec![SolverOutcome::solved(
        SolveStatus::Optimal,
        // {b,d} in column 0, {a,c} in column 1
        vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0],
        4.0,
    )]);
    let mut session = canned_loop(&solver);
    let mut script = ScriptedFeedback::new([Feedback::Accept]);
    session.run(&mut script).unwrap();

    // equal scores keep column order, members keep input order
    assert_eq!(script.proposals()[0].items, words(&["b", "d"]));
}
