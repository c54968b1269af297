use crate::error::CheckpointError;
use crate::evaluation::Evaluate;
use crate::optimization::callback::OptimizationCallback;
use crate::optimization::state::{IterationRecord, Status};
use crate::tracker::BestResult;
use crate::types::ParameterVector;

/// Outcome of a run: terminal state, final point and best result.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub solver: String,
    pub status: Status,
    pub iterations: u32,
    pub position: ParameterVector,
    pub value: Option<f64>,
    pub gradient_norm: Option<f64>,
    pub best: Option<BestResult>,
    /// Full trajectory, empty unless history was requested.
    pub history: Vec<IterationRecord>,
    pub cost_evals: usize,
    pub grad_evals: usize,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.status == Status::Converged
    }

    pub fn message(&self) -> String {
        match &self.status {
            Status::Running => "Suspended".into(),
            Status::Converged => "Converged".into(),
            Status::IterationLimitReached => "Max iterations reached".into(),
            Status::Failed { reason } => format!("Failed: {reason}"),
        }
    }
}

/// Solver interface - takes the batch evaluator and a progress callback.
pub trait Solver {
    fn name(&self) -> &str;

    /// Drive the run until it terminates or the callback asks to stop.
    ///
    /// Candidate failures and configuration errors are part of the report,
    /// never an `Err`; only a failed checkpoint write is.
    fn solve(
        &mut self,
        evaluator: &dyn Evaluate,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<RunReport, CheckpointError>;
}

/// What a gradient variant sees when computing its step.
pub(crate) struct StepContext<'a> {
    pub evaluator: &'a dyn Evaluate,
    pub position: &'a [f64],
    /// `f(position)`, penalty-substituted.
    pub value: f64,
    pub gradient: &'a [f64],
    pub epsilon: f64,
    pub bounds: Option<&'a [(f64, f64)]>,
}

/// A step chosen by a gradient variant.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Proposal {
    pub position: ParameterVector,
    /// Objective at `position` if the variant already evaluated it.
    pub value: Option<f64>,
    pub step_size: Option<f64>,
    pub evaluations: usize,
}

impl Proposal {
    pub fn unevaluated(position: ParameterVector) -> Self {
        Self {
            position,
            value: None,
            step_size: None,
            evaluations: 0,
        }
    }
}
