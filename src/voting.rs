//! Ensemble consensus: majority voting over completed trajectories.
//!
//! "Majority" here is winner-selection over scalar scores, not ballot
//! counting: the ensemble explores independently and the best trajectory
//! under the configured strategy wins.

use crate::errors::*;
use crate::sampler::SamplerResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Winner-selection criterion for the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum VotingStrategy {
    /// Lowest final energy wins; ties break by lower entropy production,
    /// then by trajectory index
    Energy,
    /// Lowest entropy production wins; ties break by lower energy,
    /// then by trajectory index
    Entropy,
    /// Lowest `energy + lambda * entropy_production` wins
    Combined { lambda: f64 },
}

impl Default for VotingStrategy {
    fn default() -> Self {
        VotingStrategy::Energy
    }
}

/// Selects the winning trajectory from an ensemble
#[derive(Debug, Clone, Copy, Default)]
pub struct MajorityVoter {
    pub strategy: VotingStrategy,
}

impl MajorityVoter {
    pub fn new(strategy: VotingStrategy) -> Self {
        Self { strategy }
    }

    /// Pick the winner. Deterministic for a fixed input ordering: on exact
    /// ties across all criteria the lowest index wins.
    pub fn vote<'a>(&self, results: &'a [SamplerResult]) -> Result<&'a SamplerResult> {
        if results.is_empty() {
            return Err(ThermoError::InvalidInput(
                "cannot vote over an empty ensemble".to_string(),
            ));
        }

        let mut winner = 0;
        for candidate in 1..results.len() {
            if self.beats(&results[candidate], &results[winner]) {
                winner = candidate;
            }
        }
        Ok(&results[winner])
    }

    /// Strict "better than": equal candidates keep the incumbent, so the
    /// lowest index wins full ties.
    fn beats(&self, candidate: &SamplerResult, incumbent: &SamplerResult) -> bool {
        match self.strategy {
            VotingStrategy::Energy => {
                match candidate.energy.total_cmp(&incumbent.energy) {
                    Ordering::Less => true,
                    Ordering::Greater => false,
                    Ordering::Equal => {
                        candidate
                            .entropy_production
                            .total_cmp(&incumbent.entropy_production)
                            == Ordering::Less
                    }
                }
            }
            VotingStrategy::Entropy => {
                match candidate
                    .entropy_production
                    .total_cmp(&incumbent.entropy_production)
                {
                    Ordering::Less => true,
                    Ordering::Greater => false,
                    Ordering::Equal => {
                        candidate.energy.total_cmp(&incumbent.energy) == Ordering::Less
                    }
                }
            }
            VotingStrategy::Combined { lambda } => {
                let candidate_score = candidate.energy + lambda * candidate.entropy_production;
                let incumbent_score = incumbent.energy + lambda * incumbent.entropy_production;
                candidate_score.total_cmp(&incumbent_score) == Ordering::Less
            }
        }
    }
}

/// Entropy-production accounting helper for the combined strategy and
/// for the dissipation audit in generation results.
#[derive(Debug, Clone, Copy)]
pub struct EntropyProductionRegularizer {
    pub lambda_entropy: f64,
    pub k_t: f64,
}

impl EntropyProductionRegularizer {
    pub fn new(lambda_entropy: f64, k_t: f64) -> Self {
        Self { lambda_entropy, k_t }
    }

    /// Penalty added to the raw energy score
    pub fn compute_regularization(&self, entropy_production: f64) -> f64 {
        self.lambda_entropy * entropy_production
    }

    /// Physical heat estimate: Q = kT * Sigma
    pub fn estimate_heat_dissipation(&self, entropy_production: f64) -> f64 {
        self.k_t * entropy_production
    }
}
