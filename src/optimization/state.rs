use super::solvers::{AdamMemory, BfgsMemory, RmsPropMemory};
use crate::error::CheckpointError;
use crate::evaluation::ResultRef;
use crate::tracker::BestResult;
use crate::types::{AlgorithmSettings, ParameterVector, RunConfig};
use serde::{Deserialize, Serialize};

/// Lifecycle of an optimizer run. Every state but `Running` is absorbing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Status {
    Running,
    Converged,
    IterationLimitReached,
    Failed { reason: String },
}

impl Status {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Variant-specific memory, tagged by algorithm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum VariantState {
    Bfgs(BfgsMemory),
    Adam(AdamMemory),
    #[serde(rename = "rmsprop")]
    RmsProp(RmsPropMemory),
    /// Population runs keep no resumable memory.
    ParticleSwarm,
}

impl VariantState {
    pub fn initial(settings: &AlgorithmSettings, dimensions: usize) -> Self {
        match settings {
            AlgorithmSettings::Bfgs(_) => Self::Bfgs(BfgsMemory::new(dimensions)),
            AlgorithmSettings::Adam(_) => Self::Adam(AdamMemory::new(dimensions)),
            AlgorithmSettings::RmsProp(_) => Self::RmsProp(RmsPropMemory::new(dimensions)),
            AlgorithmSettings::ParticleSwarm(_) => Self::ParticleSwarm,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Bfgs(_) => "bfgs",
            Self::Adam(_) => "adam",
            Self::RmsProp(_) => "rmsprop",
            Self::ParticleSwarm => "particle_swarm",
        }
    }

    /// Dimensionality the memory was sized for, if it carries any.
    fn dimensions(&self) -> Option<usize> {
        match self {
            Self::Bfgs(m) => Some(m.inverse_hessian.len()),
            Self::Adam(m) => Some(m.m.len()),
            Self::RmsProp(m) => Some(m.v.len()),
            Self::ParticleSwarm => None,
        }
    }
}

/// One row of the optimization trajectory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration number.
    pub iteration: u32,
    pub parameters: ParameterVector,
    /// Objective at `parameters` (penalty if that evaluation failed).
    pub value: f64,
    pub gradient_norm: Option<f64>,
    /// Step length taken from `parameters`, when a line search chose one.
    pub step_size: Option<f64>,
    pub reference: Option<ResultRef>,
}

/// Everything needed to continue a run after suspension.
///
/// This is the unit of checkpointing: it is mutated once per iteration and
/// read back unchanged on resume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizerState {
    /// Completed (accepted) steps.
    pub iteration: u32,
    pub position: ParameterVector,
    pub status: Status,
    pub variant: VariantState,
    /// Objective at `position`, when it has been evaluated.
    pub value: Option<f64>,
    /// Latest gradient estimate.
    pub gradient: Option<ParameterVector>,
    pub cost_evals: usize,
    pub grad_evals: usize,
    #[serde(default)]
    pub history: Vec<IterationRecord>,
    #[serde(default)]
    pub best: Option<BestResult>,
}

impl OptimizerState {
    pub fn initial(config: &RunConfig) -> Self {
        Self {
            iteration: 0,
            position: config.initial_parameters.clone(),
            status: Status::Running,
            variant: VariantState::initial(&config.algorithm, config.dimensions()),
            value: None,
            gradient: None,
            cost_evals: 0,
            grad_evals: 0,
            history: Vec::new(),
            best: None,
        }
    }

    pub fn failed(config: &RunConfig, reason: impl Into<String>) -> Self {
        Self {
            status: Status::Failed {
                reason: reason.into(),
            },
            ..Self::initial(config)
        }
    }

    pub fn gradient_norm(&self) -> Option<f64> {
        self.gradient.as_deref().map(l2_norm)
    }

    /// Check that this state can continue a run under `config`.
    pub fn check_compatible(&self, config: &RunConfig) -> Result<(), CheckpointError> {
        let n = config.dimensions();
        if self.position.len() != n {
            return Err(CheckpointError::Incompatible {
                reason: format!(
                    "position has {} dimensions, configuration has {n}",
                    self.position.len()
                ),
            });
        }
        if self.variant.name() != config.algorithm.name() {
            return Err(CheckpointError::Incompatible {
                reason: format!(
                    "state belongs to `{}`, configuration runs `{}`",
                    self.variant.name(),
                    config.algorithm.name()
                ),
            });
        }
        if let Some(m) = self.variant.dimensions().filter(|&m| m != n) {
            return Err(CheckpointError::Incompatible {
                reason: format!("{} memory has {m} dimensions, expected {n}", self.variant.name()),
            });
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, CheckpointError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CheckpointError> {
        Ok(serde_json::from_str(json)?)
    }
}

pub(crate) fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
