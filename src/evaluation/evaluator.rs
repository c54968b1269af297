use super::{Backend, Evaluate, EvaluationOutcome, Extractor, TaskBuilder};
use crate::error::{ConfigError, EvaluationError};
use crate::tracker::BestResultTracker;
use crate::types::{ParameterVector, RunConfig};
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Evaluates batches of candidates through external collaborators.
///
/// Candidates of one batch are dispatched concurrently on a dedicated thread
/// pool and reassembled in input order once every one of them has completed
/// or failed. A failure in one slot never affects another.
pub struct CandidateEvaluator<T, B, E> {
    tasks: T,
    backend: B,
    extractor: E,
    penalty: f64,
    tracker: Arc<BestResultTracker>,
    pool: rayon::ThreadPool,
    dispatched: AtomicUsize,
    failed: AtomicUsize,
}

impl<T, B, E> CandidateEvaluator<T, B, E>
where
    T: TaskBuilder,
    B: Backend<Request = T::Request>,
    E: Extractor,
{
    pub fn new(
        tasks: T,
        backend: B,
        extractor: E,
        penalty: f64,
        max_concurrency: usize,
    ) -> Result<Self, ConfigError> {
        if !penalty.is_finite() {
            return Err(ConfigError::invalid("penalty", "must be finite"));
        }
        if max_concurrency == 0 {
            return Err(ConfigError::invalid("max_concurrency", "must be at least 1"));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrency)
            .thread_name(|i| format!("reoptimize-eval-{i}"))
            .build()
            .map_err(|e| ConfigError::invalid("max_concurrency", e.to_string()))?;

        Ok(Self {
            tasks,
            backend,
            extractor,
            penalty,
            tracker: Arc::new(BestResultTracker::new()),
            pool,
            dispatched: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        })
    }

    /// Build an evaluator using the run's penalty and concurrency settings.
    pub fn from_config(
        config: &RunConfig,
        tasks: T,
        backend: B,
        extractor: E,
    ) -> Result<Self, ConfigError> {
        Self::new(tasks, backend, extractor, config.penalty, config.max_concurrency)
    }

    /// Report to a shared tracker instead of a private one.
    pub fn with_tracker(mut self, tracker: Arc<BestResultTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn shared_tracker(&self) -> Arc<BestResultTracker> {
        Arc::clone(&self.tracker)
    }

    /// Total number of candidates dispatched so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Total number of candidates that ended in failure.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Runs one candidate; a panicking collaborator fails only this slot.
    fn evaluate_isolated(&self, candidate: &[f64]) -> EvaluationOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.evaluate_one(candidate)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(EvaluationError::Backend(format!("evaluation panicked: {message}")))
            });
        result.unwrap_or_else(|reason| EvaluationOutcome::Failure { reason })
    }

    fn evaluate_one(&self, candidate: &[f64]) -> Result<EvaluationOutcome, EvaluationError> {
        let request = self.tasks.build_task(candidate)?;
        let raw = self.backend.submit(request)?;
        let value = self.extractor.extract(&raw)?;
        if !value.is_finite() {
            return Err(EvaluationError::NonFiniteObjective(value));
        }

        Ok(EvaluationOutcome::Success {
            value,
            reference: raw.reference,
        })
    }
}

impl<T, B, E> Evaluate for CandidateEvaluator<T, B, E>
where
    T: TaskBuilder,
    B: Backend<Request = T::Request>,
    E: Extractor,
{
    fn evaluate(&self, batch: &[ParameterVector]) -> Vec<EvaluationOutcome> {
        if batch.is_empty() {
            return Vec::new();
        }

        let outcomes: Vec<EvaluationOutcome> = self.pool.install(|| {
            batch
                .par_iter()
                .map(|candidate| self.evaluate_isolated(candidate))
                .collect()
        });

        let mut failures = 0;
        for (index, (candidate, outcome)) in batch.iter().zip(&outcomes).enumerate() {
            match outcome {
                EvaluationOutcome::Success { value, reference } => {
                    self.tracker.offer(*value, candidate, reference);
                }
                EvaluationOutcome::Failure { reason } => {
                    failures += 1;
                    warn!(index, %reason, "candidate evaluation failed, substituting penalty");
                }
            }
        }

        self.dispatched.fetch_add(batch.len(), Ordering::Relaxed);
        self.failed.fetch_add(failures, Ordering::Relaxed);
        debug!(size = batch.len(), failures, "batch resolved");

        outcomes
    }

    fn penalty(&self) -> f64 {
        self.penalty
    }

    fn tracker(&self) -> &BestResultTracker {
        &self.tracker
    }
}
