//! Batched, fault-tolerant candidate evaluation.
//!
//! A candidate travels `TaskBuilder` → `Backend` → `Extractor`. Any failure
//! along the way turns that slot into [`EvaluationOutcome::Failure`]; the
//! rest of the batch is unaffected.

mod backends;
mod evaluator;
mod extractors;
mod tasks;

pub use backends::{Benchmark, BenchmarkBackend, FnBackend};
pub use evaluator::CandidateEvaluator;
pub use extractors::{OutputKey, Pattern};
pub use tasks::{NamedParameters, PassThrough};

use crate::error::EvaluationError;
use crate::tracker::BestResultTracker;
use crate::types::ParameterVector;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to the concrete computation a value came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRef(String);

impl ResultRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a backend hands back for one completed computation.
#[derive(Clone, Debug, PartialEq)]
pub struct RawResult {
    pub reference: ResultRef,
    /// Named scalar outputs, in the order the backend produced them.
    pub outputs: IndexMap<String, f64>,
    /// Free-form textual output (logs, reports).
    pub log: String,
}

impl RawResult {
    pub fn new(reference: ResultRef) -> Self {
        Self {
            reference,
            outputs: IndexMap::new(),
            log: String::new(),
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: f64) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    pub fn output(&self, key: &str) -> Option<f64> {
        self.outputs.get(key).copied()
    }
}

/// Turns a candidate into a computation request.
///
/// Must be a pure function of the candidate: identical candidates yield
/// identical requests.
pub trait TaskBuilder: Send + Sync {
    type Request;

    fn build_task(&self, candidate: &[f64]) -> Result<Self::Request, EvaluationError>;
}

/// Runs one computation request to completion.
///
/// Blocks until the computation finishes or fails. Latency and concurrency
/// limits are the backend's own business.
pub trait Backend: Send + Sync {
    type Request;

    fn submit(&self, request: Self::Request) -> Result<RawResult, EvaluationError>;
}

/// Maps one raw result to one scalar objective value.
pub trait Extractor: Send + Sync {
    fn extract(&self, raw: &RawResult) -> Result<f64, EvaluationError>;
}

impl<F> Extractor for F
where
    F: Fn(&RawResult) -> Result<f64, EvaluationError> + Send + Sync,
{
    fn extract(&self, raw: &RawResult) -> Result<f64, EvaluationError> {
        self(raw)
    }
}

/// Result of evaluating one candidate.
#[derive(Clone, Debug, PartialEq)]
pub enum EvaluationOutcome {
    Success { value: f64, reference: ResultRef },
    Failure { reason: EvaluationError },
}

impl EvaluationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Objective value, with `penalty` standing in for a failure.
    pub fn value_or(&self, penalty: f64) -> f64 {
        match self {
            Self::Success { value, .. } => *value,
            Self::Failure { .. } => penalty,
        }
    }

    pub fn reference(&self) -> Option<&ResultRef> {
        match self {
            Self::Success { reference, .. } => Some(reference),
            Self::Failure { .. } => None,
        }
    }
}

/// Batch evaluation seam used by every optimizer.
///
/// `evaluate` returns exactly one outcome per input, in input order,
/// whatever fails.
pub trait Evaluate: Sync {
    fn evaluate(&self, batch: &[ParameterVector]) -> Vec<EvaluationOutcome>;

    /// Value substituted for failed candidates.
    fn penalty(&self) -> f64;

    /// Tracker that receives every successful outcome.
    fn tracker(&self) -> &BestResultTracker;

    /// Objective-value view of a batch: penalty wherever a candidate failed.
    fn objective_values(&self, batch: &[ParameterVector]) -> Vec<f64> {
        let penalty = self.penalty();
        self.evaluate(batch)
            .iter()
            .map(|outcome| outcome.value_or(penalty))
            .collect()
    }
}
