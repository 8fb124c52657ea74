//! Sampling configuration and the adaptive step-budget policy.

use crate::errors::*;
use serde::{Deserialize, Serialize};

fn default_mu() -> f64 {
    1.0
}
fn default_k_t() -> f64 {
    0.5
}
fn default_dt() -> f64 {
    0.01
}
fn default_n_steps() -> usize {
    1000
}
fn default_reference_size() -> usize {
    50
}
fn default_min_fraction() -> f64 {
    0.1
}
fn default_min_steps() -> usize {
    10
}
fn default_true() -> bool {
    true
}

/// Immutable sampling configuration. Created once per request (possibly
/// derived by `AdaptiveStepPolicy`), never mutated during sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LangevinConfig {
    /// Drag coefficient (mobility); must be > 0
    #[serde(default = "default_mu")]
    pub mu: f64,

    /// Thermal scale kT; 0 degenerates to deterministic gradient descent
    #[serde(default = "default_k_t")]
    pub k_t: f64,

    /// Integration step size; must be > 0
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Step budget per trajectory
    #[serde(default = "default_n_steps")]
    pub n_steps: usize,

    /// State dimensionality
    pub dim: usize,

    /// Explicit seed for reproducible trajectories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Record the full state sequence (n_steps + 1 states) in the result
    #[serde(default)]
    pub record_trajectory: bool,
}

impl LangevinConfig {
    pub fn new(dim: usize) -> Self {
        Self {
            mu: default_mu(),
            k_t: default_k_t(),
            dt: default_dt(),
            n_steps: default_n_steps(),
            dim,
            seed: None,
            record_trajectory: false,
        }
    }

    pub fn with_k_t(mut self, k_t: f64) -> Self {
        self.k_t = k_t;
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }

    pub fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_trajectory(mut self) -> Self {
        self.record_trajectory = true;
        self
    }

    /// Noise amplitude per the fluctuation-dissipation relation:
    /// `sqrt(2 * mu * kT * dt)`
    pub fn noise_scale(&self) -> f64 {
        (2.0 * self.mu * self.k_t * self.dt).sqrt()
    }

    pub fn validate(&self) -> Result<()> {
        if self.mu <= 0.0 || !self.mu.is_finite() {
            return Err(ThermoError::InvalidInput(format!(
                "mu must be positive and finite, got {}",
                self.mu
            )));
        }
        if self.k_t < 0.0 || !self.k_t.is_finite() {
            return Err(ThermoError::InvalidInput(format!(
                "k_t must be non-negative and finite, got {}",
                self.k_t
            )));
        }
        if self.dt <= 0.0 || !self.dt.is_finite() {
            return Err(ThermoError::InvalidInput(format!(
                "dt must be positive and finite, got {}",
                self.dt
            )));
        }
        if self.n_steps == 0 {
            return Err(ThermoError::InvalidInput(
                "n_steps must be >= 1".to_string(),
            ));
        }
        if self.dim == 0 {
            return Err(ThermoError::InvalidInput("dim must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Derives a reduced step budget from the declared problem size.
///
/// The derived `n_steps` is monotonically non-decreasing in size, never
/// exceeds the base budget, and never drops below
/// `max(min_steps, min_fraction * base)`. Deterministic; disabled means
/// the base config is returned unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveStepPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Problem size at which the full base budget is granted
    #[serde(default = "default_reference_size")]
    pub reference_size: usize,

    /// Lower bound on the derived budget, as a fraction of base
    #[serde(default = "default_min_fraction")]
    pub min_fraction: f64,

    /// Absolute floor on the derived budget
    #[serde(default = "default_min_steps")]
    pub min_steps: usize,
}

impl Default for AdaptiveStepPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            reference_size: default_reference_size(),
            min_fraction: default_min_fraction(),
            min_steps: default_min_steps(),
        }
    }
}

impl AdaptiveStepPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Map `(base, problem_size)` to the effective config
    pub fn derive(&self, base: &LangevinConfig, problem_size: usize) -> LangevinConfig {
        if !self.enabled {
            return base.clone();
        }

        let fraction = (problem_size as f64 / self.reference_size.max(1) as f64).min(1.0);
        let scaled = (base.n_steps as f64 * fraction).round() as usize;
        let floor = self
            .min_steps
            .max((base.n_steps as f64 * self.min_fraction).ceil() as usize)
            .min(base.n_steps);

        let mut derived = base.clone();
        derived.n_steps = scaled.clamp(floor, base.n_steps);
        derived
    }
}
