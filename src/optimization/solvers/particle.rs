use super::traits::{RunReport, Solver};
use crate::error::{CheckpointError, ConfigError};
use crate::evaluation::Evaluate;
use crate::optimization::callback::OptimizationCallback;
use crate::optimization::state::{IterationRecord, Status};
use crate::types::{AlgorithmSettings, ParameterVector, ParticleSwarmSettings, RunConfig};
use argmin::core::{
    ArgminError, CostFunction, Error, Executor, SendAlias, State, SyncAlias, TerminationReason,
    TerminationStatus,
};
use argmin::solver::particleswarm::ParticleSwarm;
use std::borrow::Borrow;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info};

/// Particle swarm objective: every swarm generation is one evaluator batch.
struct SwarmCost<'a> {
    evaluator: &'a dyn Evaluate,
    generations: &'a Mutex<Vec<IterationRecord>>,
    evaluations: &'a AtomicUsize,
}

impl SwarmCost<'_> {
    fn record(&self, batch: &[ParameterVector], values: &[f64]) {
        let Some((index, &value)) = values.iter().enumerate().min_by(|a, b| a.1.total_cmp(b.1)) else {
            return;
        };
        let mut generations = self.generations.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let iteration = generations.len() as u32 + 1;
        debug!(generation = iteration, size = batch.len(), best = value, "swarm generation evaluated");
        generations.push(IterationRecord {
            iteration,
            parameters: batch[index].clone(),
            value,
            gradient_norm: None,
            step_size: None,
            reference: None,
        });
    }
}

impl CostFunction for SwarmCost<'_> {
    type Param = ParameterVector;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        let batch = [param.clone()];
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        self.evaluator
            .objective_values(&batch)
            .first()
            .copied()
            .ok_or_else(|| {
                ArgminError::PotentialBug {
                    text: "evaluator returned no outcome".into(),
                }
                .into()
            })
    }

    fn bulk_cost<P>(&self, params: &[P]) -> Result<Vec<Self::Output>, Error>
    where
        P: Borrow<Self::Param> + SyncAlias,
        Self::Output: SendAlias,
        Self: SyncAlias,
    {
        let batch: Vec<ParameterVector> = params.iter().map(|p| p.borrow().clone()).collect();
        self.evaluations.fetch_add(batch.len(), Ordering::Relaxed);
        let values = self.evaluator.objective_values(&batch);
        self.record(&batch, &values);
        Ok(values)
    }
}

/// Population-based optimizer backed by `argmin`'s particle swarm.
///
/// Shares the evaluator contract with the gradient variants but keeps no
/// resumable state: a run goes from start to finish in one call.
pub struct ParticleOptimizer {
    config: RunConfig,
}

impl ParticleOptimizer {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    fn settings(&self) -> Result<(&ParticleSwarmSettings, &[(f64, f64)]), ConfigError> {
        self.config.validate()?;
        let AlgorithmSettings::ParticleSwarm(settings) = &self.config.algorithm else {
            return Err(ConfigError::UnsupportedAlgorithm {
                solver: "particle_swarm",
                algorithm: self.config.algorithm.name(),
            });
        };
        let bounds = self
            .config
            .bounds
            .as_deref()
            .ok_or(ConfigError::MissingSetting { field: "bounds" })?;
        if bounds.iter().any(|&(min, max)| min >= max) {
            return Err(ConfigError::invalid("bounds", "swarm bounds need min < max"));
        }
        Ok((settings, bounds))
    }

    fn report(&self, status: Status) -> RunReport {
        RunReport {
            solver: self.name().to_string(),
            status,
            iterations: 0,
            position: self.config.initial_parameters.clone(),
            value: None,
            gradient_norm: None,
            best: None,
            history: Vec::new(),
            cost_evals: 0,
            grad_evals: 0,
        }
    }
}

impl Solver for ParticleOptimizer {
    fn name(&self) -> &str {
        "particle_swarm"
    }

    fn solve(
        &mut self,
        evaluator: &dyn Evaluate,
        callback: &mut dyn OptimizationCallback,
    ) -> Result<RunReport, CheckpointError> {
        let (settings, bounds) = match self.settings() {
            Ok(found) => found,
            Err(e) => {
                error!(error = %e, "invalid optimizer configuration");
                return Ok(self.report(Status::Failed { reason: e.to_string() }));
            }
        };

        info!(
            solver = self.name(),
            dimensions = self.config.dimensions(),
            particles = settings.num_particles,
            itmax = self.config.itmax,
            "optimization started"
        );

        let lower: ParameterVector = bounds.iter().map(|b| b.0).collect();
        let upper: ParameterVector = bounds.iter().map(|b| b.1).collect();
        let generations = Mutex::new(Vec::new());
        let evaluations = AtomicUsize::new(0);
        let cost = SwarmCost {
            evaluator,
            generations: &generations,
            evaluations: &evaluations,
        };

        let outcome = ParticleSwarm::new((lower, upper), settings.num_particles)
            .with_inertia_factor(settings.inertia)
            .and_then(|s| s.with_cognitive_factor(settings.cognitive))
            .and_then(|s| s.with_social_factor(settings.social))
            .and_then(|solver| {
                Executor::new(cost, solver)
                    .configure(|state| state.max_iters(u64::from(self.config.itmax)))
                    .run()
            })
            .map(|result| {
                let state = result.state();
                let status = match state.get_termination_status() {
                    TerminationStatus::Terminated(TerminationReason::MaxItersReached) => {
                        Status::IterationLimitReached
                    }
                    _ => Status::Converged,
                };
                let best = state
                    .get_best_param()
                    .map(|particle| (particle.position.clone(), particle.cost));
                (state.get_iter(), status, best)
            });

        let generations = generations
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for record in &generations {
            callback.on_iteration(record);
        }

        let mut report = self.report(Status::Running);
        report.cost_evals = evaluations.into_inner();
        report.best = evaluator.tracker().best();
        if self.config.keep_history {
            report.history = generations;
        }

        match outcome {
            Ok((iterations, status, best)) => {
                report.iterations = u32::try_from(iterations).unwrap_or(u32::MAX);
                report.status = status;
                if let Some((position, value)) = best {
                    report.position = position;
                    report.value = Some(value);
                }
            }
            Err(e) => {
                error!(error = %e, "particle swarm aborted");
                report.status = Status::Failed { reason: e.to_string() };
            }
        }

        info!(
            status = %report.message(),
            iterations = report.iterations,
            cost_evals = report.cost_evals,
            best = ?report.value,
            "optimization finished"
        );
        Ok(report)
    }
}
