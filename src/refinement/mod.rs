// src/refinement/mod.rs
pub mod feedback;
pub mod session;

pub use feedback::{
    AnswerKeyFeedback, ConsoleFeedback, Feedback, FeedbackSource, RejectionSummary,
    ScriptedFeedback,
};
pub use session::{LoopState, RefinementLoop, RefinementOutcome};
