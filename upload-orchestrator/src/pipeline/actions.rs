//! Per-status actions run by the status pipelines.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use upload_ledger::{AppUploadStatus, StatusKind, Upload, UploadStatus};
use upload_services::SubmitRequest;

use super::Context;
use crate::error::Result;

/// What a status pipeline does with one matching record.
#[async_trait]
pub(crate) trait UploadAction: Send + Sync {
    /// Status this action reacts to.
    fn trigger(&self) -> StatusKind;

    /// Act on `upload`, writing any result back to the ledgers.
    async fn act(&self, upload: Upload) -> Result<()>;
}

/// Send the binary for a pending upload to the signed-in account's store.
pub(crate) struct Dispatch {
    ctx: Arc<Context>,
    store_name: String,
}

impl Dispatch {
    pub(crate) fn new(ctx: Arc<Context>, store_name: impl Into<String>) -> Self {
        Self {
            ctx,
            store_name: store_name.into(),
        }
    }
}

#[async_trait]
impl UploadAction for Dispatch {
    fn trigger(&self) -> StatusKind {
        StatusKind::Pending
    }

    async fn act(&self, upload: Upload) -> Result<()> {
        let request = SubmitRequest::binary(&upload, self.store_name.clone());
        let updated = self
            .ctx
            .remote("submit", self.ctx.services.remote.submit(request))
            .await?;

        debug!(checksum = %updated.checksum, status = %updated.kind(), "Binary dispatched");
        self.ctx.services.uploads.upsert(updated).await?;
        Ok(())
    }
}

/// Submit the metadata payload carried by `METADATA_ADDED`.
pub(crate) struct SubmitMetadata {
    ctx: Arc<Context>,
}

impl SubmitMetadata {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl UploadAction for SubmitMetadata {
    fn trigger(&self) -> StatusKind {
        StatusKind::MetadataAdded
    }

    async fn act(&self, upload: Upload) -> Result<()> {
        let UploadStatus::MetadataAdded(metadata) = &upload.status else {
            return Ok(());
        };
        let request =
            SubmitRequest::binary(&upload, upload.store_name.clone()).with_metadata(metadata.clone());
        let updated = self
            .ctx
            .remote("submit", self.ctx.services.remote.submit(request))
            .await?;

        debug!(checksum = %updated.checksum, status = %updated.kind(), "Metadata submitted");
        self.ctx.services.uploads.upsert(updated).await?;
        Ok(())
    }
}

/// Decide what a checksum unknown to the remote needs next.
///
/// Without listing metadata the upload parks in `NO_METADATA`; with it the
/// binary is sent straight away.
pub(crate) struct ResolveExistence {
    ctx: Arc<Context>,
}

impl ResolveExistence {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl UploadAction for ResolveExistence {
    fn trigger(&self) -> StatusKind {
        StatusKind::NotExistent
    }

    async fn act(&self, upload: Upload) -> Result<()> {
        let app = &upload.installed_app;
        let has_metadata = self
            .ctx
            .remote(
                "has_metadata",
                self.ctx
                    .services
                    .remote
                    .has_metadata(&app.package_name, app.version_code),
            )
            .await?;

        let next = if has_metadata {
            let request = SubmitRequest::binary(&upload, upload.store_name.clone());
            self.ctx
                .remote("submit", self.ctx.services.remote.submit(request))
                .await?
        } else {
            upload.with_status(UploadStatus::NoMetadata)
        };

        debug!(checksum = %next.checksum, has_metadata, status = %next.kind(), "Existence resolved");
        self.ctx.services.uploads.upsert(next).await?;
        Ok(())
    }
}

/// Ask the remote to re-check a checksum. The new status arrives through the
/// remote's own completion path.
pub(crate) struct RetryCheck {
    ctx: Arc<Context>,
}

impl RetryCheck {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl UploadAction for RetryCheck {
    fn trigger(&self) -> StatusKind {
        StatusKind::Retry
    }

    async fn act(&self, upload: Upload) -> Result<()> {
        self.ctx
            .remote("retry_check", self.ctx.services.remote.retry_check(&upload.checksum))
            .await
    }
}

/// Mirror a completed upload into the app-status ledger, then drop it.
pub(crate) struct Complete {
    ctx: Arc<Context>,
}

impl Complete {
    pub(crate) fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl UploadAction for Complete {
    fn trigger(&self) -> StatusKind {
        StatusKind::Completed
    }

    async fn act(&self, upload: Upload) -> Result<()> {
        self.ctx
            .services
            .statuses
            .upsert(AppUploadStatus::completed(&upload))
            .await?;
        self.ctx.services.uploads.remove(&upload).await?;

        info!(
            checksum = %upload.checksum,
            package = %upload.installed_app.package_name,
            "Upload completed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::error::UploaderError;
    use crate::pipeline::testing::Harness;
    use std::time::Duration;
    use upload_ledger::{InstalledApp, Ledger, Metadata};

    fn app() -> InstalledApp {
        InstalledApp::new("com.example", 7, "Example", "/tmp/example.apk")
    }

    fn upload(status: UploadStatus) -> Upload {
        Upload::new("m1", "own-store", app(), status)
    }

    #[tokio::test]
    async fn test_dispatch_uses_account_store() {
        let harness = Harness::new();
        harness
            .remote
            .script_submits("m1", [UploadStatus::MetadataAdded(Metadata::new("Example", "en"))]);
        let ctx = harness.context(OrchestratorConfig::default());

        Dispatch::new(ctx, "account-store")
            .act(upload(UploadStatus::Pending))
            .await
            .unwrap();

        let sent = harness.remote.submitted("m1");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].store_name, "account-store");
        assert!(sent[0].metadata.is_none());
        assert_eq!(harness.uploads.get("m1").unwrap().kind(), StatusKind::MetadataAdded);
    }

    #[tokio::test]
    async fn test_metadata_submission_carries_payload() {
        let harness = Harness::new();
        harness.remote.script_submits("m1", [UploadStatus::Completed]);
        let ctx = harness.context(OrchestratorConfig::default());
        let metadata = Metadata::new("Example", "en").with_description("An app");

        SubmitMetadata::new(ctx)
            .act(upload(UploadStatus::MetadataAdded(metadata.clone())))
            .await
            .unwrap();

        let sent = harness.remote.submitted("m1");
        assert_eq!(sent[0].metadata.as_ref(), Some(&metadata));
        assert_eq!(sent[0].store_name, "own-store");
        assert_eq!(harness.uploads.get("m1").unwrap().kind(), StatusKind::Completed);
    }

    #[tokio::test]
    async fn test_existence_without_metadata_parks_upload() {
        let harness = Harness::new();
        let ctx = harness.context(OrchestratorConfig::default());

        ResolveExistence::new(ctx)
            .act(upload(UploadStatus::NotExistent))
            .await
            .unwrap();

        assert_eq!(harness.remote.has_metadata_count(), 1);
        assert_eq!(harness.remote.submit_count("m1"), 0);
        assert_eq!(harness.uploads.get("m1").unwrap().kind(), StatusKind::NoMetadata);
    }

    #[tokio::test]
    async fn test_existence_with_metadata_submits_binary() {
        let harness = Harness::new();
        harness.remote.set_has_metadata("com.example", 7);
        harness.remote.script_submits("m1", [UploadStatus::Completed]);
        let ctx = harness.context(OrchestratorConfig::default());

        ResolveExistence::new(ctx)
            .act(upload(UploadStatus::NotExistent))
            .await
            .unwrap();

        assert_eq!(harness.remote.submit_count("m1"), 1);
        assert_eq!(harness.uploads.get("m1").unwrap().kind(), StatusKind::Completed);
    }

    #[tokio::test]
    async fn test_completion_mirrors_then_removes() {
        let harness = Harness::new();
        harness.uploads.upsert(upload(UploadStatus::Completed)).await.unwrap();
        let ctx = harness.context(OrchestratorConfig::default());

        Complete::new(ctx)
            .act(upload(UploadStatus::Completed))
            .await
            .unwrap();

        assert!(harness.uploads.is_empty());
        let status = harness.statuses.get("m1").unwrap();
        assert!(status.uploaded);
        assert_eq!(status.version_code, 7);
    }

    #[tokio::test]
    async fn test_failed_submit_leaves_record_untouched() {
        let harness = Harness::new();
        harness.uploads.upsert(upload(UploadStatus::Pending)).await.unwrap();
        harness.remote.fail_checksum("m1");
        let ctx = harness.context(OrchestratorConfig::default());

        let err = Dispatch::new(ctx, "store")
            .act(upload(UploadStatus::Pending))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(harness.uploads.get("m1").unwrap().kind(), StatusKind::Pending);
    }

    #[tokio::test]
    async fn test_retry_times_out() {
        let harness = Harness::new();
        harness.remote.hang_checksum("m1");
        let ctx = harness.context(
            OrchestratorConfig::default().with_remote_timeout(Duration::from_millis(20)),
        );

        let err = RetryCheck::new(ctx)
            .act(upload(UploadStatus::Retry))
            .await
            .unwrap_err();

        assert!(matches!(err, UploaderError::Timeout { operation: "retry_check", .. }));
        assert_eq!(harness.remote.retry_count("m1"), 1);
    }
}
