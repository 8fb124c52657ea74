//! Runtime telemetry metrics.
//!
//! Captures per-phase progress data during a generation request. Metrics
//! are streamed to JSONL for post-run analysis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline phase identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Routing,
    Sampling,
    Voting,
    Decode,
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseName::Routing => write!(f, "ROUTE"),
            PhaseName::Sampling => write!(f, "SAMPLE"),
            PhaseName::Voting => write!(f, "VOTE"),
            PhaseName::Decode => write!(f, "DECODE"),
        }
    }
}

/// Execution mode for the sampling phase
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ExecMode {
    /// Fan-out across a worker pool
    Parallel { workers: usize },
    /// Sequential trajectories on the caller's thread
    Serial,
}

impl ExecMode {
    pub fn is_parallel(&self) -> bool {
        matches!(self, ExecMode::Parallel { .. })
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecMode::Parallel { workers } => write!(f, "PAR[workers={}]", workers),
            ExecMode::Serial => write!(f, "SERIAL"),
        }
    }
}

/// Single telemetry metric for a phase step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetric {
    /// ISO8601 timestamp
    pub timestamp: String,

    /// Pipeline phase
    pub phase: PhaseName,

    /// Step description (e.g., "ensemble_8", "winner", "schedule_decode")
    pub step: String,

    /// Best energy seen at this point
    pub energy: f64,

    /// Entropy production of the relevant trajectory (or best-so-far)
    pub entropy_production: f64,

    /// Step duration in milliseconds
    pub duration_ms: f64,

    /// Execution mode
    pub exec_mode: ExecMode,

    /// Phase-specific parameters (JSON object)
    pub parameters: serde_json::Value,

    /// Optional notes/warnings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl RunMetric {
    /// Create new metric with current timestamp
    pub fn new(
        phase: PhaseName,
        step: impl Into<String>,
        energy: f64,
        entropy_production: f64,
        duration_ms: f64,
        exec_mode: ExecMode,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            phase,
            step: step.into(),
            energy,
            entropy_production,
            duration_ms,
            exec_mode,
            parameters: serde_json::Value::Null,
            notes: None,
        }
    }

    /// Add parameters as JSON
    pub fn with_parameters(mut self, params: serde_json::Value) -> Self {
        self.parameters = params;
        self
    }

    /// Add notes
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Format for terminal display
    pub fn format_terminal(&self) -> String {
        format!(
            "[{}][{}] {} | E={:.4} sigma={:.4} | {:.2}ms",
            self.phase,
            self.exec_mode,
            self.step,
            self.energy,
            self.entropy_production,
            self.duration_ms
        )
    }
}
