//! Per-run telemetry: phase metrics streamed to JSONL.

pub mod logger;
pub mod run_metric;

pub use logger::TelemetryLogger;
pub use run_metric::{ExecMode, PhaseName, RunMetric};

use uuid::Uuid;

/// Binds a logger to a single generation run. Every recorded metric is
/// tagged with the run id so interleaved runs stay separable in the
/// shared JSONL stream.
#[derive(Clone)]
pub struct TelemetryHandle {
    run_id: String,
    logger: TelemetryLogger,
}

impl TelemetryHandle {
    pub fn new(logger: TelemetryLogger) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            logger,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record(&self, metric: RunMetric) {
        self.logger.log(serde_json::json!({
            "run_id": self.run_id,
            "metric": metric,
        }));
    }
}
