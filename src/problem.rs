//! Optimization problem descriptions.
//!
//! An `OptimizationProblem` is the structured input handed over by the
//! upstream intent/entity-extraction layer. It is created once per
//! generation request and read-only afterwards; this module only checks
//! structural completeness, not upstream semantics.

use crate::errors::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Discrete problem class handled by the optimizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Schedule,
    Allocate,
    Route,
}

impl std::fmt::Display for ProblemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProblemType::Schedule => write!(f, "schedule"),
            ProblemType::Allocate => write!(f, "allocate"),
            ProblemType::Route => write!(f, "route"),
        }
    }
}

/// Single task in a scheduling problem, with a fixed resource assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub duration: f64,
    pub deadline: f64,
    /// Index of the resource this task is pinned to
    pub resource: usize,
}

/// Generic constraint descriptor as extracted upstream.
/// Only the count feeds complexity estimation; the kind string is
/// carried through for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintDescriptor {
    pub kind: String,
    #[serde(default = "default_constraint_weight")]
    pub weight: f64,
}

fn default_constraint_weight() -> f64 {
    1.0
}

/// Problem-specific size and domain fields
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum ProblemDomain {
    Schedule {
        tasks: Vec<TaskSpec>,
        num_slots: usize,
    },
    Allocate {
        /// Per-resource capacities
        capacities: Vec<f64>,
        /// Per-request demands
        demands: Vec<f64>,
        /// Cost matrix, shape [requests, resources]
        costs: Array2<f64>,
    },
    Route {
        /// Pairwise distances, shape [nodes, nodes]
        distances: Array2<f64>,
    },
}

/// Structured combinatorial sub-problem, produced upstream and consumed
/// by `ThermodynamicGenerator`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationProblem {
    pub problem_type: ProblemType,
    /// Ordered variable identifiers (one per decoded discrete variable)
    pub variables: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDescriptor>,
    pub domain: ProblemDomain,
}

impl OptimizationProblem {
    /// Build a scheduling problem; variables are the task ids.
    pub fn schedule(tasks: Vec<TaskSpec>, num_slots: usize) -> Self {
        let variables = tasks.iter().map(|t| t.id.clone()).collect();
        Self {
            problem_type: ProblemType::Schedule,
            variables,
            constraints: Vec::new(),
            domain: ProblemDomain::Schedule { tasks, num_slots },
        }
    }

    /// Build an allocation problem over `demands.len()` requests and
    /// `capacities.len()` resources.
    pub fn allocate(capacities: Vec<f64>, demands: Vec<f64>, costs: Array2<f64>) -> Self {
        let variables = (0..demands.len())
            .map(|i| format!("request_{}", i))
            .collect();
        Self {
            problem_type: ProblemType::Allocate,
            variables,
            constraints: Vec::new(),
            domain: ProblemDomain::Allocate {
                capacities,
                demands,
                costs,
            },
        }
    }

    /// Build a routing problem over `distances.nrows()` nodes.
    pub fn route(distances: Array2<f64>) -> Self {
        let variables = (0..distances.nrows())
            .map(|i| format!("node_{}", i))
            .collect();
        Self {
            problem_type: ProblemType::Route,
            variables,
            constraints: Vec::new(),
            domain: ProblemDomain::Route { distances },
        }
    }

    /// Attach constraint descriptors (builder style)
    pub fn with_constraints(mut self, constraints: Vec<ConstraintDescriptor>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Continuous relaxation dimensionality for this problem
    pub fn dim(&self) -> usize {
        match &self.domain {
            ProblemDomain::Schedule { tasks, .. } => tasks.len(),
            ProblemDomain::Allocate {
                capacities,
                demands,
                ..
            } => demands.len() * capacities.len(),
            ProblemDomain::Route { distances } => distances.nrows() * distances.nrows(),
        }
    }

    /// Declared size metric fed to the adaptive step policy
    pub fn size_metric(&self) -> usize {
        match &self.domain {
            ProblemDomain::Schedule { tasks, .. } => tasks.len(),
            ProblemDomain::Allocate {
                capacities,
                demands,
                ..
            } => demands.len().max(capacities.len()),
            ProblemDomain::Route { distances } => distances.nrows(),
        }
    }

    /// Structural validation. Fails fast with `InvalidInput` before any
    /// sampling starts.
    pub fn validate(&self) -> Result<()> {
        match (&self.problem_type, &self.domain) {
            (ProblemType::Schedule, ProblemDomain::Schedule { tasks, num_slots }) => {
                if tasks.is_empty() {
                    return Err(ThermoError::InvalidInput(
                        "schedule problem requires at least one task".to_string(),
                    ));
                }
                if *num_slots == 0 {
                    return Err(ThermoError::InvalidInput(
                        "schedule problem requires num_slots >= 1".to_string(),
                    ));
                }
                for task in tasks {
                    if task.duration <= 0.0 || !task.duration.is_finite() {
                        return Err(ThermoError::InvalidInput(format!(
                            "task '{}' has non-positive duration {}",
                            task.id, task.duration
                        )));
                    }
                    if !task.deadline.is_finite() {
                        return Err(ThermoError::InvalidInput(format!(
                            "task '{}' has non-finite deadline",
                            task.id
                        )));
                    }
                }
            }
            (
                ProblemType::Allocate,
                ProblemDomain::Allocate {
                    capacities,
                    demands,
                    costs,
                },
            ) => {
                if capacities.is_empty() || demands.is_empty() {
                    return Err(ThermoError::InvalidInput(
                        "allocation problem requires non-empty capacities and demands".to_string(),
                    ));
                }
                if costs.nrows() != demands.len() || costs.ncols() != capacities.len() {
                    return Err(ThermoError::InvalidInput(format!(
                        "cost matrix shape {:?} does not match {} requests x {} resources",
                        costs.dim(),
                        demands.len(),
                        capacities.len()
                    )));
                }
                if capacities.iter().any(|c| *c < 0.0 || !c.is_finite()) {
                    return Err(ThermoError::InvalidInput(
                        "capacities must be finite and non-negative".to_string(),
                    ));
                }
                if demands.iter().any(|d| *d < 0.0 || !d.is_finite()) {
                    return Err(ThermoError::InvalidInput(
                        "demands must be finite and non-negative".to_string(),
                    ));
                }
            }
            (ProblemType::Route, ProblemDomain::Route { distances }) => {
                if distances.nrows() < 2 {
                    return Err(ThermoError::InvalidInput(
                        "routing problem requires at least 2 nodes".to_string(),
                    ));
                }
                if distances.nrows() != distances.ncols() {
                    return Err(ThermoError::InvalidInput(format!(
                        "distance matrix must be square, got {:?}",
                        distances.dim()
                    )));
                }
            }
            (ty, _) => {
                return Err(ThermoError::InvalidInput(format!(
                    "problem_type {} does not match its domain fields",
                    ty
                )));
            }
        }

        if self.variables.is_empty() {
            return Err(ThermoError::InvalidInput(
                "problem requires at least one variable identifier".to_string(),
            ));
        }

        Ok(())
    }
}
