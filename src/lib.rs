//! thermogen: thermodynamic sampling for structured generation
//!
//! This library implements a physics-inspired optimizer for the structured
//! sub-problems of a generation service: scheduling, resource allocation,
//! and routing. Problems are relaxed to continuous energy landscapes and
//! sampled with overdamped Langevin dynamics; an ensemble of independent
//! trajectories is run (optionally in parallel), a voting stage picks the
//! winner, and the winning state is decoded back into a discrete
//! assignment. Entropy production is tracked along every trajectory as a
//! physical audit of the work dissipated to reach the answer.

pub mod config;
pub mod energy;
pub mod errors;
pub mod generator;
pub mod problem;
pub mod router;
pub mod sampler;
pub mod telemetry;
pub mod voting;

// Re-export key types
pub use config::{AdaptiveStepPolicy, LangevinConfig};
pub use energy::{ConstraintTerm, EnergyModel};
pub use errors::{Result, ThermoError};
pub use generator::{Assignment, GenerationResult, SamplingOptions, ThermodynamicGenerator};
pub use problem::{ConstraintDescriptor, OptimizationProblem, ProblemDomain, ProblemType, TaskSpec};
pub use router::{Pathway, ThermodynamicRouter, THERMODYNAMIC_INTENTS};
pub use sampler::{
    LangevinSampler, SamplerResult, SamplingCondition, CONVERGENCE_TOL, CONVERGENCE_WINDOW,
};
pub use telemetry::{TelemetryHandle, TelemetryLogger};
pub use voting::{EntropyProductionRegularizer, MajorityVoter, VotingStrategy};
