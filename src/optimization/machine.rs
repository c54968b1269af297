use super::callback::OptimizationCallback;
use super::gradient::GradientEstimator;
use super::solvers::traits::{Proposal, StepContext};
use super::solvers::{RunReport, Solver, adam, bfgs, rmsprop};
use super::state::{IterationRecord, OptimizerState, Status, VariantState, l2_norm};
use crate::checkpoint::CheckpointStore;
use crate::error::{CheckpointError, ConfigError};
use crate::evaluation::Evaluate;
use crate::tracker::BestResult;
use crate::types::{AlgorithmSettings, RunConfig};
use std::sync::Arc;
use tracing::{error, info};

/// Resumable gradient-based optimizer (BFGS, Adam or RMSProp).
///
/// Each [`step`](Self::step) is one iteration: estimate the gradient at the
/// current position, test convergence, take one step, persist. Between two
/// steps the machine can be dropped and rebuilt from its [`OptimizerState`].
pub struct GradientOptimizer {
    config: RunConfig,
    state: OptimizerState,
    estimator: GradientEstimator,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
    /// Restored best result not yet handed to the evaluator's tracker.
    pending_best: Option<BestResult>,
}

fn validate(config: &RunConfig) -> Result<(), ConfigError> {
    config.validate()?;
    if let AlgorithmSettings::ParticleSwarm(_) = config.algorithm {
        return Err(ConfigError::UnsupportedAlgorithm {
            solver: "gradient",
            algorithm: config.algorithm.name(),
        });
    }
    Ok(())
}

impl GradientOptimizer {
    /// Start a new run. An invalid configuration yields a machine already in
    /// [`Status::Failed`] that never evaluates anything.
    pub fn new(config: RunConfig) -> Self {
        let state = match validate(&config) {
            Ok(()) => OptimizerState::initial(&config),
            Err(e) => {
                error!(error = %e, "invalid optimizer configuration");
                OptimizerState::failed(&config, e.to_string())
            }
        };
        Self::with_state(config, state)
    }

    /// Continue a run from a saved state.
    pub fn resume(config: RunConfig, state: OptimizerState) -> Result<Self, CheckpointError> {
        if let Err(e) = validate(&config) {
            error!(error = %e, "invalid optimizer configuration");
            let failed = OptimizerState::failed(&config, e.to_string());
            return Ok(Self::with_state(config, failed));
        }
        state.check_compatible(&config)?;
        info!(iteration = state.iteration, solver = config.algorithm.name(), "resuming from checkpoint");
        Ok(Self::with_state(config, state))
    }

    /// Resume from `store` if it holds a state, otherwise start fresh; either
    /// way the machine keeps checkpointing to `store`.
    pub fn restore(config: RunConfig, store: Arc<dyn CheckpointStore>) -> Result<Self, CheckpointError> {
        let machine = match store.load()? {
            Some(state) => Self::resume(config, state)?,
            None => Self::new(config),
        };
        Ok(machine.with_checkpoint(store))
    }

    fn with_state(config: RunConfig, state: OptimizerState) -> Self {
        Self {
            estimator: GradientEstimator::new(config.delta, config.scheme),
            pending_best: state.best.clone(),
            config,
            state,
            checkpoint: None,
        }
    }

    /// Persist the state to `store` after every iteration.
    pub fn with_checkpoint(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint = Some(store);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn state(&self) -> &OptimizerState {
        &self.state
    }

    pub fn into_state(self) -> OptimizerState {
        self.state
    }

    pub fn status(&self) -> &Status {
        &self.state.status
    }

    /// Run one iteration.
    ///
    /// Returns the record of the step taken, or `None` when no step was
    /// taken (the run converged at the current position or was already
    /// terminal).
    pub fn step(&mut self, evaluator: &dyn Evaluate) -> Result<Option<IterationRecord>, CheckpointError> {
        if self.state.status.is_terminal() {
            return Ok(None);
        }
        self.reoffer_best(evaluator);

        let estimate = self.estimator.estimate(evaluator, &self.state.position);
        self.state.grad_evals += estimate.evaluations;
        self.state.value = Some(estimate.value);
        let gradient_norm = l2_norm(&estimate.gradient);

        if gradient_norm < self.config.tolerance {
            self.state.gradient = Some(estimate.gradient);
            self.state.status = Status::Converged;
            self.finish_iteration(evaluator)?;
            return Ok(None);
        }

        let proposal = {
            let ctx = StepContext {
                evaluator,
                position: &self.state.position,
                value: estimate.value,
                gradient: &estimate.gradient,
                epsilon: self.config.epsilon,
                bounds: self.config.bounds.as_deref(),
            };
            match (&self.config.algorithm, &mut self.state.variant) {
                (AlgorithmSettings::Bfgs(s), VariantState::Bfgs(m)) => Ok(bfgs::advance(s, m, &ctx)),
                (AlgorithmSettings::Adam(s), VariantState::Adam(m)) => Ok(adam::advance(s, m, &ctx)),
                (AlgorithmSettings::RmsProp(s), VariantState::RmsProp(m)) => Ok(rmsprop::advance(s, m, &ctx)),
                (settings, variant) => Err(format!(
                    "state holds `{}` memory but the run is configured for `{}`",
                    variant.name(),
                    settings.name()
                )),
            }
        };
        let proposal = match proposal {
            Ok(proposal) => proposal,
            Err(reason) => {
                error!(%reason, "cannot advance optimizer");
                self.state.status = Status::Failed { reason };
                self.finish_iteration(evaluator)?;
                return Ok(None);
            }
        };

        let Proposal {
            position,
            value,
            step_size,
            evaluations,
        } = proposal;
        self.state.cost_evals += evaluations;
        self.state.iteration += 1;

        let record = IterationRecord {
            iteration: self.state.iteration,
            parameters: std::mem::replace(&mut self.state.position, position),
            value: estimate.value,
            gradient_norm: Some(gradient_norm),
            step_size,
            reference: estimate.reference,
        };
        self.state.value = value;
        self.state.gradient = Some(estimate.gradient);
        info!(
            iteration = record.iteration,
            value = record.value,
            gradient_norm,
            "iteration complete"
        );

        if self.config.keep_history {
            self.state.history.push(record.clone());
        }

        if self.state.iteration >= self.config.itmax {
            self.state.status = Status::IterationLimitReached;
            if self.state.value.is_none() {
                let batch = [self.state.position.clone()];
                self.state.value = evaluator.objective_values(&batch).first().copied();
                self.state.cost_evals += 1;
            }
        }

        self.finish_iteration(evaluator)?;
        Ok(Some(record))
    }

    /// Iterate until a terminal state, or until `callback` asks to stop.
    pub fn run(
        &mut self,
        evaluator: &dyn Evaluate,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<RunReport, CheckpointError> {
        if !self.state.status.is_terminal() {
            info!(
                solver = self.config.algorithm.name(),
                dimensions = self.config.dimensions(),
                itmax = self.config.itmax,
                iteration = self.state.iteration,
                "optimization started"
            );
        }

        while !self.state.status.is_terminal() {
            if callback.should_stop() {
                info!(iteration = self.state.iteration, "run suspended by callback");
                break;
            }
            if let Some(record) = self.step(evaluator)? {
                callback.on_iteration(&record);
            }
        }

        self.reoffer_best(evaluator);
        let report = self.report(evaluator);
        info!(
            status = %report.message(),
            iterations = report.iterations,
            cost_evals = report.cost_evals,
            grad_evals = report.grad_evals,
            best = ?report.best.as_ref().map(|b| b.value),
            "optimization finished"
        );
        Ok(report)
    }

    pub fn report(&self, evaluator: &dyn Evaluate) -> RunReport {
        RunReport {
            solver: self.config.algorithm.name().to_string(),
            status: self.state.status.clone(),
            iterations: self.state.iteration,
            position: self.state.position.clone(),
            value: self.state.value,
            gradient_norm: self.state.gradient_norm(),
            best: evaluator.tracker().best().or_else(|| self.state.best.clone()),
            history: self.state.history.clone(),
            cost_evals: self.state.cost_evals,
            grad_evals: self.state.grad_evals,
        }
    }

    fn reoffer_best(&mut self, evaluator: &dyn Evaluate) {
        if let Some(best) = self.pending_best.take() {
            evaluator.tracker().restore(&best);
        }
    }

    fn finish_iteration(&mut self, evaluator: &dyn Evaluate) -> Result<(), CheckpointError> {
        self.state.best = evaluator.tracker().best();
        if let Some(store) = &self.checkpoint {
            store.save(&self.state)?;
        }
        Ok(())
    }
}

impl Solver for GradientOptimizer {
    fn name(&self) -> &str {
        self.config.algorithm.name()
    }

    fn solve(
        &mut self,
        evaluator: &dyn Evaluate,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<RunReport, CheckpointError> {
        self.run(evaluator, callback)
    }
}
