use super::traits::{Proposal, StepContext};
use crate::types::{AdamSettings, ParameterVector, clamp_params};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Adam memory: first and second moment estimates plus the step counter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdamMemory {
    pub m: ParameterVector,
    pub v: ParameterVector,
    pub t: u32,
}

impl AdamMemory {
    pub fn new(n: usize) -> Self {
        Self {
            m: vec![0.0; n],
            v: vec![0.0; n],
            t: 0,
        }
    }
}

/// `x ← x − lr·m̂/(√v̂ + ε)` with bias-corrected moments.
///
/// A step with a non-finite component is dropped whole: neither the moments
/// nor the position change.
pub(crate) fn advance(settings: &AdamSettings, memory: &mut AdamMemory, ctx: &StepContext<'_>) -> Proposal {
    let t = memory.t + 1;
    let (b1, b2) = (settings.beta1, settings.beta2);
    let m: Vec<f64> = memory
        .m
        .iter()
        .zip(ctx.gradient)
        .map(|(m, g)| b1 * m + (1.0 - b1) * g)
        .collect();
    let v: Vec<f64> = memory
        .v
        .iter()
        .zip(ctx.gradient)
        .map(|(v, g)| b2 * v + (1.0 - b2) * g * g)
        .collect();

    let m_corr = 1.0 - b1.powi(t as i32);
    let v_corr = 1.0 - b2.powi(t as i32);
    let step: Vec<f64> = m
        .iter()
        .zip(&v)
        .map(|(m, v)| {
            let denom = (v / v_corr).sqrt() + ctx.epsilon;
            if denom == 0.0 {
                0.0
            } else {
                settings.learning_rate * (m / m_corr) / denom
            }
        })
        .collect();

    let finite = |xs: &[f64]| xs.iter().all(|x| x.is_finite());
    if !(finite(&m) && finite(&v) && finite(&step)) {
        warn!(t, "non-finite Adam step, update skipped");
        return Proposal::unevaluated(ctx.position.to_vec());
    }

    memory.m = m;
    memory.v = v;
    memory.t = t;

    let mut next: ParameterVector = ctx.position.iter().zip(&step).map(|(x, s)| x - s).collect();
    clamp_params(&mut next, ctx.bounds);
    Proposal::unevaluated(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{Benchmark, BenchmarkBackend, CandidateEvaluator, OutputKey, PassThrough};
    use approx::assert_abs_diff_eq;

    fn run_step(settings: &AdamSettings, memory: &mut AdamMemory, x: &[f64], g: &[f64], epsilon: f64) -> Proposal {
        let evaluator = CandidateEvaluator::new(
            PassThrough,
            BenchmarkBackend::new(Benchmark::Sphere),
            OutputKey::new("value"),
            1e10,
            1,
        )
        .unwrap();
        let ctx = StepContext {
            evaluator: &evaluator,
            position: x,
            value: 0.0,
            gradient: g,
            epsilon,
            bounds: None,
        };
        advance(settings, memory, &ctx)
    }

    #[test]
    fn first_step_moves_by_learning_rate() {
        // With bias correction the first step is lr·sign(g) when ε ≪ |g|.
        let settings = AdamSettings {
            learning_rate: 0.1,
            beta1: 0.9,
            beta2: 0.999,
        };
        let mut memory = AdamMemory::new(2);
        let proposal = run_step(&settings, &mut memory, &[1.0, -1.0], &[4.0, -0.5], 1e-12);

        assert_abs_diff_eq!(proposal.position[0], 0.9, epsilon = 1e-9);
        assert_abs_diff_eq!(proposal.position[1], -0.9, epsilon = 1e-9);
        assert_eq!(memory.t, 1);
        assert_abs_diff_eq!(memory.m[0], 0.4, epsilon = 1e-12);
        assert_abs_diff_eq!(memory.v[0], 0.016, epsilon = 1e-12);
        assert_eq!(proposal.evaluations, 0);
    }

    #[test]
    fn zero_gradient_with_zero_epsilon_does_not_move() {
        let mut memory = AdamMemory::new(1);
        let proposal = run_step(&AdamSettings::default(), &mut memory, &[2.0], &[0.0], 0.0);

        assert_eq!(proposal.position, vec![2.0]);
        assert_eq!(memory.t, 1);
    }

    #[test]
    fn non_finite_step_is_skipped() {
        let mut memory = AdamMemory::new(1);
        let proposal = run_step(&AdamSettings::default(), &mut memory, &[2.0], &[f64::NAN], 1e-8);

        assert_eq!(proposal.position, vec![2.0]);
        assert_eq!(memory, AdamMemory::new(1));
    }

    #[test]
    fn moments_recover_after_a_skipped_step() {
        let settings = AdamSettings {
            learning_rate: 0.1,
            ..AdamSettings::default()
        };
        let mut memory = AdamMemory::new(1);
        run_step(&settings, &mut memory, &[2.0], &[f64::INFINITY], 1e-8);
        let proposal = run_step(&settings, &mut memory, &[2.0], &[4.0], 1e-12);

        assert_eq!(memory.t, 1);
        assert!(memory.m[0].is_finite() && memory.v[0].is_finite());
        assert_abs_diff_eq!(proposal.position[0], 1.9, epsilon = 1e-9);
    }
}
