//! Update rules of the gradient variants and the population variant.

pub(crate) mod adam;
pub(crate) mod bfgs;
mod particle;
pub(crate) mod rmsprop;
pub(crate) mod traits;

pub use adam::AdamMemory;
pub use bfgs::BfgsMemory;
pub use particle::ParticleOptimizer;
pub use rmsprop::RmsPropMemory;
pub use traits::{RunReport, Solver};
