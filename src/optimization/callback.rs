use super::solvers::RunReport;
use super::state::IterationRecord;
use tracing::info;

/// Progress hook invoked once per completed iteration.
pub trait OptimizationCallback {
    fn on_iteration(&mut self, record: &IterationRecord);

    /// Checked between iterations; `true` suspends the run.
    fn should_stop(&self) -> bool {
        false
    }
}

/// Ignores progress and never stops the run.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCallback;

impl OptimizationCallback for NoopCallback {
    fn on_iteration(&mut self, _record: &IterationRecord) {}
}

/// Logs each iteration through `tracing` and keeps the trajectory.
#[derive(Clone, Debug, Default)]
pub struct LoggingCallback {
    history: Vec<IterationRecord>,
    /// Suspend after this many iterations have been observed.
    stop_after: Option<u32>,
}

impl LoggingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stop_after(mut self, iterations: u32) -> Self {
        self.stop_after = Some(iterations);
        self
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    /// Log the outcome of a run together with the observed trajectory.
    pub fn log_summary(&self, report: &RunReport) {
        info!(
            solver = %report.solver,
            status = %report.message(),
            iterations = report.iterations,
            cost_evals = report.cost_evals,
            grad_evals = report.grad_evals,
            "optimization summary"
        );
        if let Some(best) = &report.best {
            info!(
                value = best.value,
                parameters = ?best.parameters,
                reference = %best.reference,
                "best result"
            );
        }
        for record in &self.history {
            info!(iteration = record.iteration, value = record.value, "history");
        }
    }
}

impl OptimizationCallback for LoggingCallback {
    fn on_iteration(&mut self, record: &IterationRecord) {
        info!(
            iteration = record.iteration,
            value = record.value,
            gradient_norm = ?record.gradient_norm,
            step_size = ?record.step_size,
            "iteration complete"
        );
        self.history.push(record.clone());
    }

    fn should_stop(&self) -> bool {
        self.stop_after
            .is_some_and(|limit| self.history.len() >= limit as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(iteration: u32) -> IterationRecord {
        IterationRecord {
            iteration,
            parameters: vec![1.0],
            value: 1.0,
            gradient_norm: Some(2.0),
            step_size: None,
            reference: None,
        }
    }

    #[test]
    fn logging_callback_keeps_history_and_stops() {
        let mut callback = LoggingCallback::new().with_stop_after(2);
        callback.on_iteration(&record(1));
        assert!(!callback.should_stop());
        callback.on_iteration(&record(2));
        assert!(callback.should_stop());
        assert_eq!(callback.history().len(), 2);
    }

    #[test]
    fn noop_never_stops() {
        let mut callback = NoopCallback;
        callback.on_iteration(&record(1));
        assert!(!callback.should_stop());
    }
}
