//! Complexity-based pathway routing.
//!
//! Decides per request whether a task is worth the sampling cost:
//! conversational work stays on the classic path, structured
//! optimization intents route to the sampler, and mid-complexity
//! requests take a reduced-budget hybrid run.

use serde::{Deserialize, Serialize};

/// Intents that always route to the sampling pipeline
pub const THERMODYNAMIC_INTENTS: [&str; 4] = ["schedule", "allocate", "route", "optimize"];

/// Intents that always bypass sampling regardless of complexity
const CLASSIC_INTENTS: [&str; 4] = ["chat", "lookup", "summarize", "translate"];

/// Keywords counted by the complexity heuristic
const COMPLEXITY_KEYWORDS: [&str; 10] = [
    "constraint",
    "deadline",
    "capacity",
    "conflict",
    "overlap",
    "minimize",
    "maximize",
    "budget",
    "shortest",
    "assign",
];

/// Execution pathway chosen for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pathway {
    /// No sampling; the request is answered directly
    Classic,
    /// Sampling with a reduced step budget
    Hybrid,
    /// Full Langevin sampling
    Langevin,
}

impl std::fmt::Display for Pathway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pathway::Classic => write!(f, "classic"),
            Pathway::Hybrid => write!(f, "hybrid"),
            Pathway::Langevin => write!(f, "langevin"),
        }
    }
}

/// Deterministic intent + complexity router
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermodynamicRouter {
    /// Complexity at or above which a thermodynamic intent gets the full
    /// Langevin pathway
    pub threshold: f64,
}

impl Default for ThermodynamicRouter {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl ThermodynamicRouter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Route a request. Same `(intent, complexity)` always yields the
    /// same pathway.
    pub fn route(&self, intent: &str, complexity: f64) -> Pathway {
        let intent = intent.to_ascii_lowercase();
        if CLASSIC_INTENTS.contains(&intent.as_str()) {
            return Pathway::Classic;
        }
        if !THERMODYNAMIC_INTENTS.contains(&intent.as_str()) {
            return Pathway::Classic;
        }
        if complexity >= self.threshold {
            Pathway::Langevin
        } else {
            Pathway::Hybrid
        }
    }

    /// Heuristic complexity estimate in [0, 1]: half keyword density,
    /// half declared constraint count.
    pub fn estimate_complexity(&self, text: &str, constraint_count: usize) -> f64 {
        let lower = text.to_ascii_lowercase();
        let hits = COMPLEXITY_KEYWORDS
            .iter()
            .filter(|kw| lower.contains(**kw))
            .count();

        let keyword_score = (hits as f64 / 4.0).min(1.0);
        let constraint_score = (constraint_count as f64 / 10.0).min(1.0);
        (0.5 * keyword_score + 0.5 * constraint_score).clamp(0.0, 1.0)
    }
}
