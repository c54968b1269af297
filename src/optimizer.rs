use crate::checkpoint::CheckpointStore;
use crate::error::CheckpointError;
use crate::evaluation::Evaluate;
use crate::optimization::{GradientOptimizer, OptimizationCallback, ParticleOptimizer, RunReport, Solver};
use crate::types::{AlgorithmSettings, RunConfig};
use std::sync::Arc;
use tracing::info;

/// Entry point: picks the solver for the configured algorithm and runs it.
pub struct Optimizer {
    config: RunConfig,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
}

impl Optimizer {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            checkpoint: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(RunConfig::from_json(json)?))
    }

    /// Checkpoint gradient runs to `store`, resuming from it when it already
    /// holds a state. Population runs ignore the store.
    pub fn with_checkpoint(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint = Some(store);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn select_solver(&self) -> Result<Box<dyn Solver>, CheckpointError> {
        let solver: Box<dyn Solver> = match (&self.config.algorithm, &self.checkpoint) {
            (AlgorithmSettings::ParticleSwarm(_), _) => Box::new(ParticleOptimizer::new(self.config.clone())),
            (_, Some(store)) => Box::new(GradientOptimizer::restore(self.config.clone(), Arc::clone(store))?),
            (_, None) => Box::new(GradientOptimizer::new(self.config.clone())),
        };
        info!(solver = solver.name(), "solver selected");
        Ok(solver)
    }

    pub fn run(
        &self,
        evaluator: &dyn Evaluate,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<RunReport, CheckpointError> {
        self.select_solver()?.solve(evaluator, callback)
    }
}
