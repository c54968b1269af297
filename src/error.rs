use thiserror::Error;

/// Invalid or inconsistent run settings.
///
/// Detected once, before any evaluation is issued. A run that fails
/// validation ends immediately in [`Status::Failed`](crate::Status::Failed).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("`{field}` has {found} entries but the problem has {expected} dimensions")]
    DimensionMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("missing required setting `{field}`")]
    MissingSetting { field: &'static str },

    #[error("solver `{solver}` cannot run the `{algorithm}` algorithm")]
    UnsupportedAlgorithm {
        solver: &'static str,
        algorithm: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Why a single candidate could not be evaluated.
///
/// Never fatal: the evaluator turns it into
/// [`EvaluationOutcome::Failure`](crate::EvaluationOutcome::Failure) and the
/// optimizer sees the penalty value instead.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluationError {
    #[error("failed to build computation request: {0}")]
    TaskBuild(String),

    #[error("computation backend failed: {0}")]
    Backend(String),

    #[error("failed to extract objective: {0}")]
    Extraction(String),

    #[error("objective value is not finite: {0}")]
    NonFiniteObjective(f64),
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("checkpoint does not match the run configuration: {reason}")]
    Incompatible { reason: String },
}
