//! Overdamped Langevin integrator (Euler–Maruyama) with entropy bookkeeping.
//!
//! Single-step update:
//! `z <- z - mu*dt*grad(E) + sqrt(2*mu*kT*dt) * eps`, eps ~ N(0, I).
//!
//! Each trajectory owns its state vector and random stream; the model and
//! config are shared read-only, so the parallel path needs no locking.

use crate::config::LangevinConfig;
use crate::energy::EnergyModel;
use crate::errors::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;

/// Relative tolerance for the trailing-window convergence check
pub const CONVERGENCE_TOL: f64 = 1e-4;
/// Number of checkpoint energies that must agree for convergence
pub const CONVERGENCE_WINDOW: usize = 3;

/// Per-request sampling inputs shared read-only across trajectories
#[derive(Debug, Clone, Default)]
pub struct SamplingCondition {
    /// Initial state; drawn from a standard-normal prior when absent
    pub warm_start: Option<Vec<f64>>,
}

impl SamplingCondition {
    pub fn warm(state: Vec<f64>) -> Self {
        Self {
            warm_start: Some(state),
        }
    }
}

/// Output record of a single trajectory
#[derive(Debug, Clone)]
pub struct SamplerResult {
    /// Final state vector, length `dim`
    pub state: Vec<f64>,
    /// Energy at the final state
    pub energy: f64,
    /// Full state sequence (`steps_executed + 1` entries) when requested
    pub trajectory: Option<Vec<Vec<f64>>>,
    /// Accumulated dissipated work over kT; exactly 0 when kT = 0
    pub entropy_production: f64,
    /// Steps actually executed (early stop on convergence)
    pub steps_executed: usize,
    /// Whether the trailing-window energy check stabilized
    pub converged: bool,
}

/// The SDE integrator. Immutable for the duration of a request.
pub struct LangevinSampler {
    model: EnergyModel,
    config: LangevinConfig,
}

/// Derive an independent per-trajectory seed from the master seed
fn sub_seed(master: u64, index: u64) -> u64 {
    master ^ index.wrapping_add(1).wrapping_mul(0x9E3779B97F4A7C15)
}

const RETRY_SALT: u64 = 0xD1B54A32D192ED03;

fn energy_stabilized(checkpoints: &[f64]) -> bool {
    if checkpoints.len() < CONVERGENCE_WINDOW {
        return false;
    }
    let window = &checkpoints[checkpoints.len() - CONVERGENCE_WINDOW..];
    let max = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = window.iter().cloned().fold(f64::INFINITY, f64::min);
    let scale = window
        .iter()
        .map(|e| e.abs())
        .fold(0.0_f64, f64::max)
        .max(1e-9);
    (max - min) / scale < CONVERGENCE_TOL
}

impl LangevinSampler {
    pub fn new(model: EnergyModel, config: LangevinConfig) -> Result<Self> {
        config.validate()?;
        if model.dim() != config.dim {
            return Err(ThermoError::InvalidInput(format!(
                "model dim {} does not match config dim {}",
                model.dim(),
                config.dim
            )));
        }
        Ok(Self { model, config })
    }

    pub fn config(&self) -> &LangevinConfig {
        &self.config
    }

    pub fn model(&self) -> &EnergyModel {
        &self.model
    }

    /// Run a single trajectory. With a fixed seed, config, and condition
    /// the output is reproducible.
    pub fn sample(&self, condition: &SamplingCondition) -> Result<SamplerResult> {
        let master = self.master_seed();
        self.run_trajectory(condition, sub_seed(master, 0))
    }

    /// Run `n_samples` independent trajectories sequentially, each with an
    /// independently derived sub-seed.
    pub fn sample_ensemble(
        &self,
        condition: &SamplingCondition,
        n_samples: usize,
    ) -> Result<Vec<SamplerResult>> {
        if n_samples == 0 {
            return Err(ThermoError::InvalidInput(
                "n_samples must be >= 1".to_string(),
            ));
        }
        self.check_condition(condition)?;
        let master = self.master_seed();
        (0..n_samples)
            .map(|i| self.run_trajectory(condition, sub_seed(master, i as u64)))
            .collect()
    }

    /// Statistically equivalent to `sample_ensemble`, executed across up to
    /// `max_workers` concurrent workers (fan-out/fan-in, join then vote).
    ///
    /// A trajectory producing a non-finite value is retried once with a
    /// fresh sub-seed; if the retry also fails it is excluded with a logged
    /// diagnostic. Sibling trajectories are never aborted.
    pub fn sample_parallel(
        &self,
        condition: &SamplingCondition,
        n_samples: usize,
        max_workers: usize,
    ) -> Result<Vec<SamplerResult>> {
        if n_samples == 0 {
            return Err(ThermoError::InvalidInput(
                "n_samples must be >= 1".to_string(),
            ));
        }
        self.check_condition(condition)?;
        let master = self.master_seed();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers.max(1))
            .build()
            .map_err(|e| ThermoError::SamplingFailed(format!("worker pool: {}", e)))?;

        let outcomes: Vec<std::result::Result<SamplerResult, ThermoError>> = pool.install(|| {
            (0..n_samples)
                .into_par_iter()
                .map(|i| self.run_with_retry(condition, master, i))
                .collect()
        });

        let mut results = Vec::with_capacity(n_samples);
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(failure) => {
                    eprintln!("[SAMPLER] trajectory excluded: {}", failure);
                }
            }
        }

        if results.is_empty() {
            return Err(ThermoError::SamplingFailed(format!(
                "all {} parallel trajectories failed",
                n_samples
            )));
        }
        Ok(results)
    }

    /// One retry with a fresh sub-seed before giving up on a trajectory
    fn run_with_retry(
        &self,
        condition: &SamplingCondition,
        master: u64,
        index: usize,
    ) -> std::result::Result<SamplerResult, ThermoError> {
        match self.run_trajectory(condition, sub_seed(master, index as u64)) {
            Ok(result) => Ok(result),
            Err(first) => self
                .run_trajectory(condition, sub_seed(master ^ RETRY_SALT, index as u64))
                .map_err(|_| ThermoError::WorkerFailure {
                    index,
                    reason: format!("retry failed after: {}", first),
                }),
        }
    }

    /// Reject a malformed condition before any trajectory is dispatched
    fn check_condition(&self, condition: &SamplingCondition) -> Result<()> {
        if let Some(start) = &condition.warm_start {
            if start.len() != self.config.dim {
                return Err(ThermoError::InvalidInput(format!(
                    "warm start length {} does not match dim {}",
                    start.len(),
                    self.config.dim
                )));
            }
        }
        Ok(())
    }

    fn master_seed(&self) -> u64 {
        self.config.seed.unwrap_or_else(|| rand::thread_rng().gen())
    }

    fn run_trajectory(&self, condition: &SamplingCondition, seed: u64) -> Result<SamplerResult> {
        let dim = self.config.dim;
        let n_steps = self.config.n_steps;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut z: Vec<f64> = match &condition.warm_start {
            Some(start) => {
                if start.len() != dim {
                    return Err(ThermoError::InvalidInput(format!(
                        "warm start length {} does not match dim {}",
                        start.len(),
                        dim
                    )));
                }
                start.clone()
            }
            None => (0..dim).map(|_| rng.sample(StandardNormal)).collect(),
        };

        let drift_scale = self.config.mu * self.config.dt;
        let noise_scale = self.config.noise_scale();
        let check_interval = (n_steps / 10).max(1);

        let mut trajectory = if self.config.record_trajectory {
            let mut t = Vec::with_capacity(n_steps + 1);
            t.push(z.clone());
            Some(t)
        } else {
            None
        };

        let mut dissipated_work = 0.0;
        let mut checkpoints: Vec<f64> = Vec::new();
        let mut steps_executed = 0;
        let mut converged = false;

        for step in 0..n_steps {
            let grad = self.model.gradient(&z);

            for k in 0..dim {
                let drift = -drift_scale * grad[k];
                // Heat released along the drift: force dot displacement
                dissipated_work += -grad[k] * drift;

                let noise = if noise_scale > 0.0 {
                    noise_scale * rng.sample::<f64, _>(StandardNormal)
                } else {
                    0.0
                };
                z[k] += drift + noise;

                if !z[k].is_finite() {
                    return Err(ThermoError::SamplingFailed(format!(
                        "non-finite state at step {} coordinate {}",
                        step, k
                    )));
                }
            }

            steps_executed = step + 1;
            if let Some(ref mut t) = trajectory {
                t.push(z.clone());
            }

            if steps_executed % check_interval == 0 {
                let e = self.model.energy(&z);
                if !e.is_finite() {
                    return Err(ThermoError::SamplingFailed(format!(
                        "non-finite energy at step {}",
                        step
                    )));
                }
                checkpoints.push(e);
                if energy_stabilized(&checkpoints) {
                    converged = true;
                    break;
                }
            }
        }

        let energy = self.model.energy(&z);
        if !energy.is_finite() {
            return Err(ThermoError::SamplingFailed(
                "non-finite final energy".to_string(),
            ));
        }

        // At kT = 0 the dynamics are plain gradient descent: no heat bath,
        // no entropy production by definition
        let entropy_production = if self.config.k_t > 0.0 {
            dissipated_work / self.config.k_t
        } else {
            0.0
        };

        Ok(SamplerResult {
            state: z,
            energy,
            trajectory,
            entropy_production,
            steps_executed,
            converged,
        })
    }
}
