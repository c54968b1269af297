use crate::evaluation::{Evaluate, ResultRef};
use crate::types::{DifferenceScheme, ParameterVector};

/// Finite-difference gradient of the objective, one batch per estimate.
///
/// The batch always starts with the unperturbed point, so every estimate
/// also yields `f(x)`: `1 + 2n` candidates for central differences,
/// `1 + n` for forward differences. Failed probes enter the arithmetic as
/// the penalty value, side by side, with no special casing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientEstimator {
    delta: f64,
    scheme: DifferenceScheme,
}

/// Objective value and gradient at one point.
#[derive(Clone, Debug, PartialEq)]
pub struct GradientEstimate {
    /// `f(x)`, or the penalty if that evaluation failed.
    pub value: f64,
    pub reference: Option<ResultRef>,
    pub gradient: ParameterVector,
    /// Candidates dispatched for this estimate.
    pub evaluations: usize,
    pub failures: usize,
}

impl GradientEstimator {
    pub fn new(delta: f64, scheme: DifferenceScheme) -> Self {
        Self { delta, scheme }
    }

    pub fn scheme(&self) -> DifferenceScheme {
        self.scheme
    }

    /// Candidate batch for `point`: the point itself, then the perturbations
    /// along each axis (`+δ` then `−δ` per axis for central differences).
    pub fn probes(&self, point: &[f64]) -> Vec<ParameterVector> {
        let per_axis = match self.scheme {
            DifferenceScheme::Central => 2,
            DifferenceScheme::Forward => 1,
        };
        let mut batch = Vec::with_capacity(1 + per_axis * point.len());
        batch.push(point.to_vec());

        for i in 0..point.len() {
            let mut plus = point.to_vec();
            plus[i] += self.delta;
            batch.push(plus);

            if self.scheme == DifferenceScheme::Central {
                let mut minus = point.to_vec();
                minus[i] -= self.delta;
                batch.push(minus);
            }
        }

        batch
    }

    pub fn estimate(&self, evaluator: &dyn Evaluate, point: &[f64]) -> GradientEstimate {
        let batch = self.probes(point);
        let outcomes = evaluator.evaluate(&batch);
        let penalty = evaluator.penalty();
        let values: Vec<f64> = outcomes.iter().map(|o| o.value_or(penalty)).collect();

        let f0 = values[0];
        let gradient = match self.scheme {
            DifferenceScheme::Central => values[1..]
                .chunks_exact(2)
                .map(|pair| (pair[0] - pair[1]) / (2.0 * self.delta))
                .collect(),
            DifferenceScheme::Forward => values[1..]
                .iter()
                .map(|f| (f - f0) / self.delta)
                .collect(),
        };

        GradientEstimate {
            value: f0,
            reference: outcomes[0].reference().cloned(),
            gradient,
            evaluations: batch.len(),
            failures: outcomes.iter().filter(|o| !o.is_success()).count(),
        }
    }

    /// Gradient alone, same dimensionality as `point`.
    pub fn gradient(&self, evaluator: &dyn Evaluate, point: &[f64]) -> ParameterVector {
        self.estimate(evaluator, point).gradient
    }
}
