//! Configuration for the upload orchestrator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use upload_ledger::Comparison;

use crate::error::UploaderError;

/// Configuration for an [`UploadOrchestrator`](crate::UploadOrchestrator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Timeout applied to every remote call (ms)
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,

    /// Maximum concurrent per-record actions in one pipeline
    #[serde(default = "default_max_concurrent_actions")]
    pub max_concurrent_actions: usize,

    /// Apps checksummed in parallel during startup seeding
    #[serde(default = "default_seed_concurrency")]
    pub seed_concurrency: usize,

    /// How often failed or skipped per-record actions are retried (ms)
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Change detection used by the reconciliation pipeline
    #[serde(default)]
    pub reconcile_comparison: Comparison,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: default_remote_timeout_ms(),
            max_concurrent_actions: default_max_concurrent_actions(),
            seed_concurrency: default_seed_concurrency(),
            retry_interval_ms: default_retry_interval_ms(),
            reconcile_comparison: Comparison::Full,
        }
    }
}

fn default_remote_timeout_ms() -> u64 { 30_000 }
fn default_max_concurrent_actions() -> usize { 8 }
fn default_seed_concurrency() -> usize { 2 }
fn default_retry_interval_ms() -> u64 { 5_000 }

impl OrchestratorConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, UploaderError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| UploaderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, UploaderError> {
        serde_yaml::to_string(self).map_err(|e| UploaderError::Config(e.to_string()))
    }

    /// Reject limits that would stall every pipeline.
    pub fn validate(&self) -> Result<(), UploaderError> {
        if self.remote_timeout_ms == 0 {
            return Err(UploaderError::Config("remote_timeout_ms must be > 0".into()));
        }
        if self.max_concurrent_actions == 0 {
            return Err(UploaderError::Config("max_concurrent_actions must be > 0".into()));
        }
        if self.seed_concurrency == 0 {
            return Err(UploaderError::Config("seed_concurrency must be > 0".into()));
        }
        if self.retry_interval_ms == 0 {
            return Err(UploaderError::Config("retry_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Set the interval between retries of failed actions.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the remote call timeout.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the per-pipeline concurrency limit.
    pub fn with_max_concurrent_actions(mut self, max: usize) -> Self {
        self.max_concurrent_actions = max;
        self
    }

    /// Set the reconciliation comparison.
    pub fn with_reconcile_comparison(mut self, comparison: Comparison) -> Self {
        self.reconcile_comparison = comparison;
        self
    }
}
