use super::traits::{Proposal, StepContext};
use crate::types::{ParameterVector, RmsPropSettings, clamp_params};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// RMSProp memory: running average of squared gradients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RmsPropMemory {
    pub v: ParameterVector,
}

impl RmsPropMemory {
    pub fn new(n: usize) -> Self {
        Self { v: vec![0.0; n] }
    }
}

/// `v ← ρv + (1−ρ)g²`, `x ← x − lr·g/(√v + ε)`.
pub(crate) fn advance(settings: &RmsPropSettings, memory: &mut RmsPropMemory, ctx: &StepContext<'_>) -> Proposal {
    let rho = settings.rho;
    let v: Vec<f64> = memory
        .v
        .iter()
        .zip(ctx.gradient)
        .map(|(v, g)| rho * v + (1.0 - rho) * g * g)
        .collect();

    let step: Vec<f64> = v
        .iter()
        .zip(ctx.gradient)
        .map(|(v, g)| {
            let denom = v.sqrt() + ctx.epsilon;
            if denom == 0.0 { 0.0 } else { settings.learning_rate * g / denom }
        })
        .collect();

    if v.iter().chain(&step).any(|x| !x.is_finite()) {
        warn!("non-finite RMSProp step, update skipped");
        return Proposal::unevaluated(ctx.position.to_vec());
    }

    memory.v = v;
    let mut next: ParameterVector = ctx.position.iter().zip(&step).map(|(x, s)| x - s).collect();
    clamp_params(&mut next, ctx.bounds);
    Proposal::unevaluated(next)
}
