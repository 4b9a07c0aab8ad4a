//! Runtime counters and the status report built from them.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters owned by one pipeline.
#[derive(Debug)]
pub(crate) struct PipelineStats {
    name: &'static str,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl PipelineStats {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A record was matched but an action for it was already running.
    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn report(&self) -> PipelineReport {
        PipelineReport {
            name: self.name.to_string(),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of one pipeline's counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub name: String,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Current orchestrator state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether pipelines are running
    pub running: bool,
    /// When the current run started
    pub started_at: Option<DateTime<Utc>>,
    /// Per-pipeline counters, cumulative across runs
    pub pipelines: Vec<PipelineReport>,
}

impl OrchestratorStatus {
    /// Counters for the named pipeline.
    pub fn pipeline(&self, name: &str) -> Option<&PipelineReport> {
        self.pipelines.iter().find(|p| p.name == name)
    }
}
