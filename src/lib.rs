//! Resumable optimization over expensive, failure-prone objective evaluations.
//!
//! Candidates are evaluated in batches through caller-supplied collaborators
//! ([`TaskBuilder`], [`Backend`], [`Extractor`]); failed candidates take a
//! penalty value. Gradient variants (BFGS, Adam, RMSProp) run as explicit
//! state machines whose [`OptimizerState`] can be checkpointed between
//! iterations, and a particle swarm variant shares the same evaluator.

pub mod checkpoint;
pub mod error;
pub mod evaluation;
pub mod optimization;
mod optimizer;
pub mod tracker;
pub mod types;

pub use checkpoint::{CheckpointStore, FileCheckpoint, MemoryCheckpoint};
pub use error::{CheckpointError, ConfigError, EvaluationError};
pub use evaluation::{
    Backend, Benchmark, BenchmarkBackend, CandidateEvaluator, Evaluate, EvaluationOutcome, Extractor, FnBackend,
    NamedParameters, OutputKey, PassThrough, Pattern, RawResult, ResultRef, TaskBuilder,
};
pub use optimization::*;
pub use optimizer::Optimizer;
pub use tracker::{BestResult, BestResultTracker};
pub use types::*;
