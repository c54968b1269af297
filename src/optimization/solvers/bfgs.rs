use super::traits::{Proposal, StepContext};
use crate::optimization::state::dot;
use crate::types::{BfgsSettings, ParameterVector, clamp_params};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// BFGS memory: inverse-Hessian approximation and the previous iterate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BfgsMemory {
    pub inverse_hessian: Vec<Vec<f64>>,
    pub previous_position: Option<ParameterVector>,
    pub previous_gradient: Option<ParameterVector>,
}

impl BfgsMemory {
    pub fn new(n: usize) -> Self {
        Self {
            inverse_hessian: identity(n),
            previous_position: None,
            previous_gradient: None,
        }
    }
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Secant update `H ← (I − ρsyᵀ) H (I − ρysᵀ) + ρssᵀ`, `ρ = 1/(yᵀs)`.
///
/// Returns `false` and leaves `h` untouched when the curvature `yᵀs` is not
/// above `epsilon`.
pub(crate) fn update_inverse_hessian(h: &mut [Vec<f64>], s: &[f64], y: &[f64], epsilon: f64) -> bool {
    let ys = dot(y, s);
    if !(ys > epsilon) {
        return false;
    }

    let n = s.len();
    let rho = 1.0 / ys;
    let hy = mat_vec(h, y);
    // yᵀH, H is symmetric up to rounding but keep the general form.
    let yh: Vec<f64> = (0..n).map(|j| (0..n).map(|k| y[k] * h[k][j]).sum()).collect();
    let yhy = dot(y, &hy);

    let mut next = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            next[i][j] = h[i][j] - rho * (hy[i] * s[j] + s[i] * yh[j])
                + (rho * rho * yhy + rho) * s[i] * s[j];
        }
    }

    if next.iter().flatten().any(|x| !x.is_finite()) {
        return false;
    }
    for (row, new_row) in h.iter_mut().zip(next) {
        *row = new_row;
    }
    true
}

/// Accepted line-search step.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LineSearchResult {
    pub step_size: f64,
    pub position: ParameterVector,
    /// Objective at `position`; `None` when the search was exhausted.
    pub value: Option<f64>,
    pub evaluations: usize,
}

/// Point `x + t·d`, projected into the bounds.
fn trial(position: &[f64], direction: &[f64], t: f64, bounds: Option<&[(f64, f64)]>) -> ParameterVector {
    let mut point: ParameterVector = position
        .iter()
        .zip(direction)
        .map(|(x, d)| x + t * d)
        .collect();
    clamp_params(&mut point, bounds);
    point
}

/// Backtracking search on `t ∈ {α, αβ, αβ², …}` for the Armijo condition
/// `f(x + t·d) ≤ f(x) + σ·t·gᵀd`.
///
/// Probes are dispatched `probes_per_batch` at a time; the first probe in
/// shrink order that satisfies the condition wins, so the accepted step does
/// not depend on the batch size. When every probe fails the step
/// `α·β^linesearch_max_iter` is taken without evaluating it.
pub(crate) fn line_search(
    settings: &BfgsSettings,
    ctx: &StepContext<'_>,
    direction: &[f64],
    slope: f64,
) -> LineSearchResult {
    let max_iter = settings.linesearch_max_iter as i32;
    let steps: Vec<f64> = (0..max_iter)
        .map(|k| settings.alpha * settings.beta.powi(k))
        .collect();

    let mut evaluations = 0;
    for chunk in steps.chunks(settings.probes_per_batch.max(1)) {
        let batch: Vec<ParameterVector> = chunk
            .iter()
            .map(|&t| trial(ctx.position, direction, t, ctx.bounds))
            .collect();
        let values = ctx.evaluator.objective_values(&batch);
        evaluations += batch.len();

        for ((&t, point), f_trial) in chunk.iter().zip(batch).zip(values) {
            let threshold = ctx.value + settings.sigma * t * slope;
            debug!(step_size = t, value = f_trial, threshold, "line-search probe");
            if f_trial <= threshold {
                return LineSearchResult {
                    step_size: t,
                    position: point,
                    value: Some(f_trial),
                    evaluations,
                };
            }
        }
    }

    let t = settings.alpha * settings.beta.powi(max_iter);
    warn!(step_size = t, "line search exhausted, taking the smallest step");
    LineSearchResult {
        step_size: t,
        position: trial(ctx.position, direction, t, ctx.bounds),
        value: None,
        evaluations,
    }
}

/// One BFGS iteration: secant update from the previous iterate, search
/// direction `d = −H·g`, backtracking line search along `d`.
pub(crate) fn advance(settings: &BfgsSettings, memory: &mut BfgsMemory, ctx: &StepContext<'_>) -> Proposal {
    let g = ctx.gradient;
    if g.iter().any(|v| !v.is_finite()) {
        warn!("non-finite gradient, BFGS step skipped");
        return Proposal::unevaluated(ctx.position.to_vec());
    }

    if let (Some(prev_x), Some(prev_g)) = (&memory.previous_position, &memory.previous_gradient) {
        let s: Vec<f64> = ctx.position.iter().zip(prev_x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g.iter().zip(prev_g).map(|(a, b)| a - b).collect();
        if !update_inverse_hessian(&mut memory.inverse_hessian, &s, &y, ctx.epsilon) {
            warn!(curvature = dot(&y, &s), "degenerate curvature, inverse Hessian left unchanged");
        }
    }

    let mut direction: Vec<f64> = mat_vec(&memory.inverse_hessian, g).iter().map(|v| -v).collect();
    let mut slope = dot(g, &direction);
    if !(slope < 0.0) || direction.iter().any(|v| !v.is_finite()) {
        warn!(slope, "not a descent direction, resetting inverse Hessian");
        memory.inverse_hessian = identity(g.len());
        direction = g.iter().map(|v| -v).collect();
        slope = -dot(g, g);
    }

    let accepted = line_search(settings, ctx, &direction, slope);
    debug!(step_size = accepted.step_size, "BFGS step accepted");

    memory.previous_position = Some(ctx.position.to_vec());
    memory.previous_gradient = Some(g.to_vec());

    Proposal {
        position: accepted.position,
        value: accepted.value,
        step_size: Some(accepted.step_size),
        evaluations: accepted.evaluations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{Benchmark, BenchmarkBackend, CandidateEvaluator, Evaluate, OutputKey, PassThrough};
    use approx::assert_abs_diff_eq;

    fn sphere() -> impl Evaluate {
        CandidateEvaluator::new(
            PassThrough,
            BenchmarkBackend::new(Benchmark::Sphere),
            OutputKey::new("value"),
            1e10,
            2,
        )
        .unwrap()
    }

    fn ctx<'a>(evaluator: &'a dyn Evaluate, x: &'a [f64], value: f64, g: &'a [f64]) -> StepContext<'a> {
        StepContext {
            evaluator,
            position: x,
            value,
            gradient: g,
            epsilon: 1e-10,
            bounds: None,
        }
    }

    #[test]
    fn secant_update_satisfies_secant_equation() {
        let mut h = identity(2);
        let s = [0.5, -0.25];
        let y = [1.0, -1.0];

        assert!(update_inverse_hessian(&mut h, &s, &y, 1e-10));

        let hy = mat_vec(&h, &y);
        assert_abs_diff_eq!(hy[0], s[0], epsilon = 1e-12);
        assert_abs_diff_eq!(hy[1], s[1], epsilon = 1e-12);
        assert_abs_diff_eq!(h[0][1], h[1][0], epsilon = 1e-12);
    }

    #[test]
    fn degenerate_curvature_leaves_hessian_unchanged() {
        let mut h = identity(2);
        assert!(!update_inverse_hessian(&mut h, &[1.0, 0.0], &[-1.0, 0.0], 1e-10));
        assert!(!update_inverse_hessian(&mut h, &[1e-8, 0.0], &[1e-8, 0.0], 1e-10));
        assert_eq!(h, identity(2));
    }

    #[test]
    fn steepest_descent_on_sphere_halves_to_origin() {
        let evaluator = sphere();
        let x = [2.0, -1.0];
        let g = [4.0, -2.0];
        let mut memory = BfgsMemory::new(2);

        let proposal = advance(&BfgsSettings::default(), &mut memory, &ctx(&evaluator, &x, 5.0, &g));

        // t = 1 overshoots to -x with the same value; t = 0.5 lands on the minimum.
        assert_eq!(proposal.step_size, Some(0.5));
        assert_eq!(proposal.position, vec![0.0, 0.0]);
        assert_eq!(proposal.value, Some(0.0));
        assert_eq!(proposal.evaluations, 2);
        assert_eq!(memory.previous_position, Some(x.to_vec()));
    }

    #[test]
    fn accepted_step_satisfies_armijo_or_search_is_exhausted() {
        let evaluator = sphere();
        let settings = BfgsSettings {
            linesearch_max_iter: 6,
            ..BfgsSettings::default()
        };
        let cases: [([f64; 2], [f64; 2]); 4] = [
            ([3.0, 1.0], [-1.0, 0.0]),
            ([0.1, 0.1], [-100.0, -100.0]),
            ([1.0, 1.0], [1.0, 1.0]),
            ([-2.0, 5.0], [4.0, -10.0]),
        ];

        for (x, d) in cases {
            let value = Benchmark::Sphere.value(&x);
            let g = [2.0 * x[0], 2.0 * x[1]];
            let slope = dot(&g, &d);
            let result = line_search(&settings, &ctx(&evaluator, &x, value, &g), &d, slope);

            let exhausted = settings.alpha * settings.beta.powi(6);
            match result.value {
                Some(f) => {
                    assert!(f <= value + settings.sigma * result.step_size * slope);
                    assert_eq!(f, Benchmark::Sphere.value(&result.position));
                }
                None => assert_eq!(result.step_size, exhausted),
            }
        }
    }

    #[test]
    fn ascent_direction_exhausts_search() {
        let evaluator = sphere();
        let settings = BfgsSettings {
            linesearch_max_iter: 4,
            ..BfgsSettings::default()
        };
        let x = [1.0];
        let g = [2.0];
        let result = line_search(&settings, &ctx(&evaluator, &x, 1.0, &g), &[1.0], 2.0);

        assert_eq!(result.value, None);
        assert_eq!(result.step_size, 0.5f64.powi(4));
        assert_eq!(result.evaluations, 4);
        assert_eq!(result.position, vec![1.0 + 0.5f64.powi(4)]);
    }

    #[test]
    fn batched_probes_pick_the_same_step() {
        let evaluator = sphere();
        let x = [3.0, -4.0];
        let g = [6.0, -8.0];
        // A poor direction needs several backtracks.
        let d = [-60.0, 80.0];
        let slope = dot(&g, &d);

        let sequential = line_search(&BfgsSettings::default(), &ctx(&evaluator, &x, 25.0, &g), &d, slope);
        let batched = line_search(
            &BfgsSettings {
                probes_per_batch: 4,
                ..BfgsSettings::default()
            },
            &ctx(&evaluator, &x, 25.0, &g),
            &d,
            slope,
        );

        assert_eq!(sequential.step_size, batched.step_size);
        assert_eq!(sequential.position, batched.position);
        assert!(batched.evaluations >= sequential.evaluations);
    }

    #[test]
    fn non_descent_direction_resets_to_steepest_descent() {
        let evaluator = sphere();
        let mut memory = BfgsMemory::new(1);
        memory.inverse_hessian = vec![vec![-1.0]];
        let x = [1.0];
        let g = [2.0];

        let proposal = advance(&BfgsSettings::default(), &mut memory, &ctx(&evaluator, &x, 1.0, &g));

        assert_eq!(memory.inverse_hessian, identity(1));
        assert_eq!(proposal.position, vec![0.0]);
    }

    #[test]
    fn overflowed_gradient_keeps_the_current_point() {
        let evaluator = sphere();
        let mut memory = BfgsMemory::new(2);
        let x = [1e-3, 2.0];
        let g = [f64::INFINITY, 4.0];

        let proposal = advance(&BfgsSettings::default(), &mut memory, &ctx(&evaluator, &x, 4.0, &g));

        assert_eq!(proposal.position, x.to_vec());
        assert_eq!(proposal.evaluations, 0);
        assert!(evaluator.tracker().best().is_none());
        assert_eq!(memory, BfgsMemory::new(2));
    }
}
