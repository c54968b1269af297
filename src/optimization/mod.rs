pub mod callback;
pub mod gradient;
mod machine;
pub mod solvers;
pub mod state;

pub use callback::{LoggingCallback, NoopCallback, OptimizationCallback};
pub use gradient::{GradientEstimate, GradientEstimator};
pub use machine::GradientOptimizer;
pub use solvers::{AdamMemory, BfgsMemory, ParticleOptimizer, RmsPropMemory, RunReport, Solver};
pub use state::{IterationRecord, OptimizerState, Status, VariantState};
