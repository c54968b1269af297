use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// A candidate point in parameter space.
pub type ParameterVector = Vec<f64>;

// ===== ENUMS =====

/// Finite-difference scheme used by the gradient estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceScheme {
    /// `(f(x+δe_i) − f(x−δe_i)) / 2δ`, `2n` probes.
    #[default]
    Central,
    /// `(f(x+δe_i) − f(x)) / δ`, `n` probes.
    Forward,
}

/// Algorithm-specific settings table, tagged by algorithm name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum AlgorithmSettings {
    Bfgs(BfgsSettings),
    Adam(AdamSettings),
    #[serde(rename = "rmsprop")]
    RmsProp(RmsPropSettings),
    ParticleSwarm(ParticleSwarmSettings),
}

impl AlgorithmSettings {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bfgs(_) => "bfgs",
            Self::Adam(_) => "adam",
            Self::RmsProp(_) => "rmsprop",
            Self::ParticleSwarm(_) => "particle_swarm",
        }
    }

    fn validate(&self, has_bounds: bool) -> Result<(), ConfigError> {
        match self {
            Self::Bfgs(s) => {
                positive("alpha", s.alpha)?;
                open_unit("beta", s.beta)?;
                open_unit("sigma", s.sigma)?;
                if s.linesearch_max_iter == 0 {
                    return Err(ConfigError::invalid("linesearch_max_iter", "must be at least 1"));
                }
                if s.probes_per_batch == 0 {
                    return Err(ConfigError::invalid("probes_per_batch", "must be at least 1"));
                }
            }
            Self::Adam(s) => {
                positive("learning_rate", s.learning_rate)?;
                half_open_unit("beta1", s.beta1)?;
                half_open_unit("beta2", s.beta2)?;
            }
            Self::RmsProp(s) => {
                positive("learning_rate", s.learning_rate)?;
                half_open_unit("rho", s.rho)?;
            }
            Self::ParticleSwarm(s) => {
                if !has_bounds {
                    return Err(ConfigError::MissingSetting { field: "bounds" });
                }
                if s.num_particles == 0 {
                    return Err(ConfigError::invalid("num_particles", "must be at least 1"));
                }
                for (field, value) in [
                    ("inertia", s.inertia),
                    ("cognitive", s.cognitive),
                    ("social", s.social),
                ] {
                    if !value.is_finite() || value < 0.0 {
                        return Err(ConfigError::invalid(field, "must be finite and non-negative"));
                    }
                }
            }
        }
        Ok(())
    }
}

// ===== SETTINGS =====

/// BFGS with backtracking (Armijo) line search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BfgsSettings {
    /// Initial line-search step size.
    pub alpha: f64,
    /// Shrink factor applied after each rejected probe.
    pub beta: f64,
    /// Armijo sufficient-decrease constant.
    pub sigma: f64,
    pub linesearch_max_iter: u32,
    /// Backtracking probes dispatched together in one batch.
    pub probes_per_batch: usize,
}

impl Default for BfgsSettings {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.5,
            sigma: 1e-4,
            linesearch_max_iter: 20,
            probes_per_batch: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamSettings {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
}

impl Default for AdamSettings {
    fn default() -> Self {
        Self {
            learning_rate: 5e-2,
            beta1: 0.5,
            beta2: 0.999,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RmsPropSettings {
    pub learning_rate: f64,
    pub rho: f64,
}

impl Default for RmsPropSettings {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            rho: 0.9,
        }
    }
}

/// Particle swarm defaults: w=0.7, c1=1.5, c2=1.5, 20 particles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleSwarmSettings {
    pub num_particles: usize,
    pub inertia: f64,
    pub cognitive: f64,
    pub social: f64,
}

impl Default for ParticleSwarmSettings {
    fn default() -> Self {
        Self {
            num_particles: 20,
            inertia: 0.7,
            cognitive: 1.5,
            social: 1.5,
        }
    }
}

// ===== RUN CONFIGURATION =====

fn default_itmax() -> u32 {
    100
}

fn default_tolerance() -> f64 {
    1e-3
}

fn default_epsilon() -> f64 {
    1e-10
}

fn default_delta() -> f64 {
    1e-6
}

fn default_penalty() -> f64 {
    1e10
}

fn default_concurrency() -> usize {
    num_cpus::get()
}

/// Caller-supplied settings for one optimization run, validated once at start.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub initial_parameters: ParameterVector,
    /// Optional box `(min, max)` per dimension; candidates are clamped into it.
    #[serde(default)]
    pub bounds: Option<Vec<(f64, f64)>>,
    #[serde(default = "default_itmax")]
    pub itmax: u32,
    /// Gradient-norm threshold for convergence.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Numerical-stability floor for denominators.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Finite-difference step.
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Objective value substituted for failed candidates.
    #[serde(default = "default_penalty")]
    pub penalty: f64,
    #[serde(default)]
    pub scheme: DifferenceScheme,
    /// Keep the full trajectory instead of reporting only the best result.
    #[serde(default)]
    pub keep_history: bool,
    /// Upper bound on candidates dispatched concurrently.
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    pub algorithm: AlgorithmSettings,
}

impl RunConfig {
    pub fn new(initial_parameters: ParameterVector, algorithm: AlgorithmSettings) -> Self {
        Self {
            initial_parameters,
            bounds: None,
            itmax: default_itmax(),
            tolerance: default_tolerance(),
            epsilon: default_epsilon(),
            delta: default_delta(),
            penalty: default_penalty(),
            scheme: DifferenceScheme::default(),
            keep_history: false,
            max_concurrency: default_concurrency(),
            algorithm,
        }
    }

    pub fn with_bounds(mut self, bounds: Vec<(f64, f64)>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_itmax(mut self, itmax: u32) -> Self {
        self.itmax = itmax;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_penalty(mut self, penalty: f64) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn with_scheme(mut self, scheme: DifferenceScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_history(mut self, keep_history: bool) -> Self {
        self.keep_history = keep_history;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn dimensions(&self) -> usize {
        self.initial_parameters.len()
    }

    /// Check every setting, reporting the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.dimensions();
        if n == 0 {
            return Err(ConfigError::invalid("initial_parameters", "must not be empty"));
        }
        if self.initial_parameters.iter().any(|x| !x.is_finite()) {
            return Err(ConfigError::invalid("initial_parameters", "must be finite"));
        }
        if self.itmax == 0 {
            return Err(ConfigError::invalid("itmax", "must be a positive integer"));
        }
        positive("tolerance", self.tolerance)?;
        positive("delta", self.delta)?;
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ConfigError::invalid("epsilon", "must be finite and non-negative"));
        }
        if !self.penalty.is_finite() {
            return Err(ConfigError::invalid("penalty", "must be finite"));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::invalid("max_concurrency", "must be at least 1"));
        }

        if let Some(bounds) = &self.bounds {
            if bounds.len() != n {
                return Err(ConfigError::DimensionMismatch {
                    field: "bounds",
                    expected: n,
                    found: bounds.len(),
                });
            }
            if bounds
                .iter()
                .any(|&(min, max)| !min.is_finite() || !max.is_finite() || min > max)
            {
                return Err(ConfigError::invalid("bounds", "each bound must be finite with min <= max"));
            }
        }

        self.algorithm.validate(self.bounds.is_some())
    }
}

/// Clamp `params` into `bounds`, dimension by dimension.
#[inline]
pub(crate) fn clamp_params(params: &mut [f64], bounds: Option<&[(f64, f64)]>) {
    if let Some(bounds) = bounds {
        for (value, &(min, max)) in params.iter_mut().zip(bounds) {
            *value = value.clamp(min, max);
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be finite and positive"))
    }
}

fn open_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must lie in (0, 1)"))
    }
}

fn half_open_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must lie in [0, 1)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bfgs() -> AlgorithmSettings {
        AlgorithmSettings::Bfgs(BfgsSettings::default())
    }

    #[test]
    fn defaults_follow_reference_values() {
        let config = RunConfig::from_json(
            r#"{ "initial_parameters": [1.0, 2.0], "algorithm": { "name": "bfgs" } }"#,
        )
        .unwrap();

        assert_eq!(config.itmax, 100);
        assert_eq!(config.tolerance, 1e-3);
        assert_eq!(config.epsilon, 1e-10);
        assert_eq!(config.delta, 1e-6);
        assert_eq!(config.penalty, 1e10);
        assert_eq!(config.scheme, DifferenceScheme::Central);
        assert!(!config.keep_history);
        assert_eq!(config.algorithm, bfgs());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_settings_table_keeps_other_defaults() {
        let config = RunConfig::from_json(
            r#"{
                "initial_parameters": [0.5],
                "itmax": 7,
                "scheme": "forward",
                "algorithm": { "name": "adam", "learning_rate": 0.001 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.itmax, 7);
        assert_eq!(config.scheme, DifferenceScheme::Forward);
        match config.algorithm {
            AlgorithmSettings::Adam(s) => {
                assert_eq!(s.learning_rate, 0.001);
                assert_eq!(s.beta1, 0.5);
                assert_eq!(s.beta2, 0.999);
            }
            other => panic!("unexpected settings {other:?}"),
        }
    }

    #[test]
    fn rmsprop_tag_is_accepted() {
        let config = RunConfig::from_json(
            r#"{ "initial_parameters": [0.5], "algorithm": { "name": "rmsprop", "rho": 0.5 } }"#,
        )
        .unwrap();
        assert_eq!(config.algorithm.name(), "rmsprop");
    }

    #[test]
    fn bounds_dimension_mismatch_is_reported() {
        let config = RunConfig::new(vec![1.0, 2.0], bfgs()).with_bounds(vec![(0.0, 1.0)]);

        assert_eq!(
            config.validate(),
            Err(ConfigError::DimensionMismatch {
                field: "bounds",
                expected: 2,
                found: 1,
            })
        );
    }

    #[test]
    fn zero_itmax_is_rejected() {
        let config = RunConfig::new(vec![1.0], bfgs()).with_itmax(0);

        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "itmax"),
            other => panic!("expected itmax error, got {other:?}"),
        }
    }

    #[test]
    fn particle_swarm_requires_bounds() {
        let config = RunConfig::new(
            vec![1.0],
            AlgorithmSettings::ParticleSwarm(ParticleSwarmSettings::default()),
        );

        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingSetting { field: "bounds" })
        );
    }

    #[test]
    fn line_search_settings_are_checked() {
        let settings = BfgsSettings {
            beta: 1.5,
            ..BfgsSettings::default()
        };
        let config = RunConfig::new(vec![1.0], AlgorithmSettings::Bfgs(settings));

        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "beta"),
            other => panic!("expected beta error, got {other:?}"),
        }
    }

    #[test]
    fn clamp_respects_bounds() {
        let mut params = vec![-2.0, 0.5, 9.0];
        clamp_params(&mut params, Some(&[(-1.0, 1.0), (0.0, 1.0), (0.0, 3.0)]));
        assert_eq!(params, vec![-1.0, 0.5, 3.0]);

        let mut untouched = vec![5.0];
        clamp_params(&mut untouched, None);
        assert_eq!(untouched, vec![5.0]);
    }
}
