use super::{Backend, RawResult, ResultRef};
use crate::error::EvaluationError;
use crate::types::ParameterVector;
use std::f64::consts::{E, PI};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Adapts a closure into a [`Backend`].
pub struct FnBackend<Q, F> {
    run: F,
    _request: PhantomData<fn(Q)>,
}

impl<Q, F> FnBackend<Q, F>
where
    F: Fn(Q) -> Result<RawResult, EvaluationError> + Send + Sync,
{
    pub fn new(run: F) -> Self {
        Self {
            run,
            _request: PhantomData,
        }
    }
}

impl<Q, F> Backend for FnBackend<Q, F>
where
    F: Fn(Q) -> Result<RawResult, EvaluationError> + Send + Sync,
{
    type Request = Q;

    fn submit(&self, request: Q) -> Result<RawResult, EvaluationError> {
        (self.run)(request)
    }
}

/// Classic test objectives, each with global minimum 0 at the origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Benchmark {
    Sphere,
    Rastrigin,
    Ackley,
}

impl Benchmark {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sphere => "sphere",
            Self::Rastrigin => "rastrigin",
            Self::Ackley => "ackley",
        }
    }

    pub fn value(&self, x: &[f64]) -> f64 {
        let n = x.len() as f64;
        match self {
            Self::Sphere => x.iter().map(|v| v * v).sum(),
            Self::Rastrigin => {
                const A: f64 = 10.0;
                A * n
                    + x.iter()
                        .map(|v| v * v - A * (2.0 * PI * v).cos())
                        .sum::<f64>()
            }
            Self::Ackley => {
                const A: f64 = 20.0;
                const B: f64 = 0.2;
                const C: f64 = 2.0 * PI;
                let sum_sq: f64 = x.iter().map(|v| v * v).sum();
                let sum_cos: f64 = x.iter().map(|v| (C * v).cos()).sum();
                -A * (-B * (sum_sq / n).sqrt()).exp() - (sum_cos / n).exp() + A + E
            }
        }
    }
}

/// Local stand-in for a simulation code: evaluates a [`Benchmark`] in-process.
///
/// Reports the objective under the `value` output and as a `value = ...`
/// log line.
#[derive(Debug)]
pub struct BenchmarkBackend {
    function: Benchmark,
    jobs: AtomicU64,
}

impl BenchmarkBackend {
    pub fn new(function: Benchmark) -> Self {
        Self {
            function,
            jobs: AtomicU64::new(0),
        }
    }

    /// Number of computations run so far.
    pub fn jobs(&self) -> u64 {
        self.jobs.load(Ordering::Relaxed)
    }
}

impl Backend for BenchmarkBackend {
    type Request = ParameterVector;

    fn submit(&self, request: ParameterVector) -> Result<RawResult, EvaluationError> {
        if request.is_empty() {
            return Err(EvaluationError::Backend("empty parameter vector".into()));
        }

        let job = self.jobs.fetch_add(1, Ordering::Relaxed);
        let value = self.function.value(&request);
        Ok(
            RawResult::new(ResultRef::new(format!("{}-{job}", self.function.name())))
                .with_output("value", value)
                .with_log(format!("{} evaluation\nvalue = {value:e}\n", self.function.name())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn benchmarks_vanish_at_origin() {
        for function in [Benchmark::Sphere, Benchmark::Rastrigin, Benchmark::Ackley] {
            assert_abs_diff_eq!(function.value(&[0.0, 0.0, 0.0]), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn benchmark_values_away_from_origin() {
        assert_abs_diff_eq!(Benchmark::Sphere.value(&[1.0, 2.0]), 5.0);
        // cos(2π) = 1, so each unit coordinate contributes 1.
        assert_abs_diff_eq!(Benchmark::Rastrigin.value(&[1.0, -1.0]), 2.0, epsilon = 1e-12);
        assert!(Benchmark::Ackley.value(&[1.0]) > 0.0);
    }

    #[test]
    fn backend_issues_unique_references() {
        let backend = BenchmarkBackend::new(Benchmark::Sphere);
        let a = backend.submit(vec![1.0]).unwrap();
        let b = backend.submit(vec![1.0]).unwrap();

        assert_ne!(a.reference, b.reference);
        assert_eq!(a.output("value"), Some(1.0));
        assert!(a.log.contains("value = 1e0"));
        assert_eq!(backend.jobs(), 2);
    }

    #[test]
    fn empty_request_fails() {
        let backend = BenchmarkBackend::new(Benchmark::Ackley);
        assert!(backend.submit(Vec::new()).is_err());
    }
}
