// src/refinement/feedback.rs

use log::{debug, info};
use std::collections::{BTreeSet, VecDeque};
use std::io::{self, BufRead, Stdout, Write};

use crate::error::{Result, SolveError};
use crate::models::Group;

/// Operator verdict on a proposed group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Accept,
    Reject,
}

impl Feedback {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feedback::Accept => "accept",
            Feedback::Reject => "reject",
        }
    }
}

/// Confirmed/rejected state handed to the feedback source after a rejection.
#[derive(Debug, Clone, Copy)]
pub struct RejectionSummary<'a> {
    pub confirmed: &'a [Group],
    pub rejected: &'a [Group],
    pub rejection_count: usize,
    pub remaining_groups: usize,
}

/// Whoever judges proposals: a person at a terminal, a script, an answer key.
pub trait FeedbackSource {
    /// Judge `proposal`, the top entry of `ranking`.
    fn propose(&mut self, proposal: &Group, ranking: &[Group]) -> Result<Feedback>;

    fn rejected(&mut self, _summary: &RejectionSummary<'_>) -> Result<()> {
        Ok(())
    }
}

//------------------------------------------------------------------------------
// CONSOLE
//------------------------------------------------------------------------------

/// Asks a human on a line-oriented terminal.
pub struct ConsoleFeedback<R, W> {
    reader: R,
    writer: W,
    show_ranking: bool,
}

impl ConsoleFeedback<io::StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleFeedback<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            show_ranking: true,
        }
    }

    pub fn with_ranking(mut self, show: bool) -> Self {
        self.show_ranking = show;
        self
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn read_answer(&mut self) -> Result<Feedback> {
        loop {
            write!(self.writer, "Was this group correct? (y/n) ")?;
            self.writer.flush()?;

            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(SolveError::Feedback(
                    "input closed before an answer was given".into(),
                ));
            }
            match line.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(Feedback::Accept),
                "n" | "no" => return Ok(Feedback::Reject),
                other => {
                    debug!("Ignoring unrecognized answer '{}'", other);
                    writeln!(self.writer, "Please answer y or n.")?;
                }
            }
        }
    }
}

impl<R: BufRead, W: Write> FeedbackSource for ConsoleFeedback<R, W> {
    fn propose(&mut self, proposal: &Group, ranking: &[Group]) -> Result<Feedback> {
        if self.show_ranking {
            writeln!(self.writer, "\nRanked groups:")?;
            for (rank, group) in ranking.iter().enumerate() {
                writeln!(
                    self.writer,
                    "{}: ({:8.2}) {}",
                    rank,
                    group.score,
                    group.items.join(", ")
                )?;
            }
        }
        writeln!(
            self.writer,
            "\nProposed group: {} (score {:.2})",
            proposal.items.join(", "),
            proposal.score
        )?;
        self.read_answer()
    }

    fn rejected(&mut self, summary: &RejectionSummary<'_>) -> Result<()> {
        writeln!(self.writer, "Confirmed groups:")?;
        for group in summary.confirmed {
            writeln!(self.writer, "  {}", group.items.join(", "))?;
        }
        writeln!(self.writer, "Rejected groups:")?;
        for group in summary.rejected {
            writeln!(self.writer, "  {}", group.items.join(", "))?;
        }
        writeln!(
            self.writer,
            "Rejections so far: {} ({} groups left to find)",
            summary.rejection_count, summary.remaining_groups
        )?;
        Ok(())
    }
}

//------------------------------------------------------------------------------
// SCRIPTED
//------------------------------------------------------------------------------

/// Replays a fixed list of answers and records what it was shown.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFeedback {
    answers: VecDeque<Feedback>,
    proposals: Vec<Group>,
    summaries: usize,
}

impl ScriptedFeedback {
    pub fn new(answers: impl IntoIterator<Item = Feedback>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            proposals: Vec::new(),
            summaries: 0,
        }
    }

    pub fn proposals(&self) -> &[Group] {
        &self.proposals
    }

    pub fn summaries(&self) -> usize {
        self.summaries
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl FeedbackSource for ScriptedFeedback {
    fn propose(&mut self, proposal: &Group, _ranking: &[Group]) -> Result<Feedback> {
        self.proposals.push(proposal.clone());
        self.answers
            .pop_front()
            .ok_or_else(|| SolveError::Feedback("scripted answers exhausted".into()))
    }

    fn rejected(&mut self, _summary: &RejectionSummary<'_>) -> Result<()> {
        self.summaries += 1;
        Ok(())
    }
}

//------------------------------------------------------------------------------
// ANSWER KEY
//------------------------------------------------------------------------------

/// Accepts a proposal iff it is exactly one of the known groups.
#[derive(Debug, Clone)]
pub struct AnswerKeyFeedback {
    answers: Vec<BTreeSet<String>>,
    decisions: usize,
}

impl AnswerKeyFeedback {
    pub fn new(groups: impl IntoIterator<Item = Vec<String>>) -> Self {
        Self {
            answers: groups
                .into_iter()
                .map(|g| g.into_iter().collect())
                .collect(),
            decisions: 0,
        }
    }

    pub fn decisions(&self) -> usize {
        self.decisions
    }

    pub fn is_answer(&self, group: &Group) -> bool {
        let key = group.key();
        self.answers
            .iter()
            .any(|answer| answer.len() == key.len() && answer.iter().all(|t| key.contains(t.as_str())))
    }
}

impl FeedbackSource for AnswerKeyFeedback {
    fn propose(&mut self, proposal: &Group, _ranking: &[Group]) -> Result<Feedback> {
        self.decisions += 1;
        let feedback = if self.is_answer(proposal) {
            Feedback::Accept
        } else {
            Feedback::Reject
        };
        info!(
            "Answer key says {} for [{}]",
            feedback.as_str(),
            proposal.items.join(", ")
        );
        Ok(feedback)
    }
}
