//! Scriptable in-process remote store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use upload_ledger::{AppUploadStatus, Upload, UploadStatus};

use crate::traits::{ClaimRequest, ServiceError, SubmitRequest, UploadService};

/// Mock remote store for testing.
///
/// Claims return `Pending` unless scripted otherwise. Each `submit` for a
/// checksum pops the next scripted status; an exhausted script is a rejection.
/// Individual checksums can be made to fail or hang.
pub struct MockUploadService {
    claim_statuses: DashMap<String, UploadStatus>,
    submit_scripts: DashMap<String, VecDeque<UploadStatus>>,
    metadata_known: DashSet<(String, u64)>,
    remote_statuses: DashMap<String, AppUploadStatus>,
    failing: DashSet<String>,
    hanging: DashSet<String>,
    latency: Option<Duration>,
    submits: DashMap<String, Vec<SubmitRequest>>,
    claim_calls: AtomicU32,
    has_metadata_calls: AtomicU32,
    status_of_calls: AtomicU32,
    retry_calls: DashMap<String, u32>,
}

impl MockUploadService {
    /// Create a mock with no scripted behaviour.
    pub fn new() -> Self {
        Self {
            claim_statuses: DashMap::new(),
            submit_scripts: DashMap::new(),
            metadata_known: DashSet::new(),
            remote_statuses: DashMap::new(),
            failing: DashSet::new(),
            hanging: DashSet::new(),
            latency: None,
            submits: DashMap::new(),
            claim_calls: AtomicU32::new(0),
            has_metadata_calls: AtomicU32::new(0),
            status_of_calls: AtomicU32::new(0),
            retry_calls: DashMap::new(),
        }
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Status returned by `claim` for `checksum`.
    pub fn script_claim(&self, checksum: impl Into<String>, status: UploadStatus) {
        self.claim_statuses.insert(checksum.into(), status);
    }

    /// Statuses returned by successive `submit` calls for `checksum`.
    pub fn script_submits(
        &self,
        checksum: impl Into<String>,
        statuses: impl IntoIterator<Item = UploadStatus>,
    ) {
        self.submit_scripts
            .entry(checksum.into())
            .or_default()
            .extend(statuses);
    }

    /// Mark listing metadata as already present for a build.
    pub fn set_has_metadata(&self, package_name: impl Into<String>, version_code: u64) {
        self.metadata_known.insert((package_name.into(), version_code));
    }

    /// Remote truth returned by `status_of`.
    pub fn set_remote_status(&self, status: AppUploadStatus) {
        self.remote_statuses.insert(status.checksum.clone(), status);
    }

    /// Every call touching `checksum` fails with a network error.
    pub fn fail_checksum(&self, checksum: impl Into<String>) {
        self.failing.insert(checksum.into());
    }

    /// Every call touching `checksum` never completes.
    pub fn hang_checksum(&self, checksum: impl Into<String>) {
        self.hanging.insert(checksum.into());
    }

    /// Let calls for `checksum` through again.
    pub fn heal_checksum(&self, checksum: &str) {
        self.failing.remove(checksum);
        self.hanging.remove(checksum);
    }

    pub fn claim_count(&self) -> u32 {
        self.claim_calls.load(Ordering::SeqCst)
    }

    pub fn has_metadata_count(&self) -> u32 {
        self.has_metadata_calls.load(Ordering::SeqCst)
    }

    pub fn status_of_count(&self) -> u32 {
        self.status_of_calls.load(Ordering::SeqCst)
    }

    /// Number of `submit` calls for `checksum`.
    pub fn submit_count(&self, checksum: &str) -> usize {
        self.submits.get(checksum).map(|s| s.len()).unwrap_or(0)
    }

    /// Recorded `submit` requests for `checksum`, oldest first.
    pub fn submitted(&self, checksum: &str) -> Vec<SubmitRequest> {
        self.submits.get(checksum).map(|s| s.value().clone()).unwrap_or_default()
    }

    /// Number of `retry_check` calls for `checksum`.
    pub fn retry_count(&self, checksum: &str) -> u32 {
        self.retry_calls.get(checksum).map(|c| *c.value()).unwrap_or(0)
    }

    async fn gate(&self, checksum: &str) -> Result<(), ServiceError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.hanging.contains(checksum) {
            futures::future::pending::<()>().await;
        }
        if self.failing.contains(checksum) {
            return Err(ServiceError::Network(format!("injected failure for {checksum}")));
        }
        Ok(())
    }
}

impl Default for MockUploadService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UploadService for MockUploadService {
    async fn claim(&self, request: ClaimRequest) -> Result<Upload, ServiceError> {
        self.claim_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(&request.checksum).await?;

        let status = self
            .claim_statuses
            .get(&request.checksum)
            .map(|s| s.value().clone())
            .unwrap_or(UploadStatus::Pending);

        Ok(Upload::new(request.checksum, request.store_name, request.app, status))
    }

    async fn submit(&self, request: SubmitRequest) -> Result<Upload, ServiceError> {
        self.submits
            .entry(request.checksum.clone())
            .or_default()
            .push(request.clone());
        self.gate(&request.checksum).await?;

        let next = self
            .submit_scripts
            .get_mut(&request.checksum)
            .and_then(|mut script| script.pop_front());

        match next {
            Some(status) => Ok(Upload::new(request.checksum, request.store_name, request.app, status)),
            None => Err(ServiceError::Rejected(format!(
                "no scripted submit response for {}",
                request.checksum
            ))),
        }
    }

    async fn has_metadata(&self, package_name: &str, version_code: u64) -> Result<bool, ServiceError> {
        self.has_metadata_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self
            .metadata_known
            .contains(&(package_name.to_string(), version_code)))
    }

    async fn status_of(&self, checksums: &[String]) -> Result<Vec<AppUploadStatus>, ServiceError> {
        self.status_of_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(checksums
            .iter()
            .filter_map(|c| self.remote_statuses.get(c).map(|s| s.value().clone()))
            .collect())
    }

    async fn retry_check(&self, checksum: &str) -> Result<(), ServiceError> {
        *self.retry_calls.entry(checksum.to_string()).or_insert(0) += 1;
        self.gate(checksum).await
    }
}
