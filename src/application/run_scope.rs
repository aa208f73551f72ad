//! Scoped observability handle for one harvest run
//!
//! Logs the start of a run and, on every exit path, its duration and
//! terminal status. A scope dropped without [`RunScope::finish`] (panic or
//! cancelled future) is reported as interrupted.

use std::time::{Duration, Instant};
use tracing::{Span, error, info, info_span, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    CircuitOpen,
    Failed,
    Interrupted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Completed => "completed",
            Self::CircuitOpen => "aborted (circuit open)",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        };
        f.write_str(label)
    }
}

/// What a finished scope reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub elapsed: Duration,
}

pub struct RunScope {
    run_id: Uuid,
    label: String,
    started_at: Instant,
    span: Span,
    finished: bool,
}

impl RunScope {
    pub fn start(label: impl Into<String>) -> Self {
        let run_id = Uuid::new_v4();
        let label = label.into();
        let span = info_span!("harvest_run", run_id = %run_id, label = %label);
        span.in_scope(|| info!("▶️ Run '{}' started", label));

        Self {
            run_id,
            label,
            started_at: Instant::now(),
            span,
            finished: false,
        }
    }

    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Span to instrument the run's futures with
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn finish(mut self, status: RunStatus) -> RunSummary {
        self.finished = true;
        let elapsed = self.elapsed();
        self.span.in_scope(|| match status {
            RunStatus::Completed => info!("🏁 Run '{}' {} in {:.2?}", self.label, status, elapsed),
            RunStatus::CircuitOpen | RunStatus::Interrupted => {
                warn!("⛔ Run '{}' {} after {:.2?}", self.label, status, elapsed);
            }
            RunStatus::Failed => error!("❌ Run '{}' {} after {:.2?}", self.label, status, elapsed),
        });

        RunSummary {
            run_id: self.run_id,
            status,
            elapsed,
        }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        if !self.finished {
            let elapsed = self.elapsed();
            self.span.in_scope(|| {
                warn!("⛔ Run '{}' {} after {:.2?}", self.label, RunStatus::Interrupted, elapsed);
            });
        }
    }
}
