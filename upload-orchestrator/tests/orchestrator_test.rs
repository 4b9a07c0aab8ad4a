//! Upload orchestrator integration tests
//!
//! Drives a full orchestrator against the in-process mocks:
//! - claim through completion with metadata
//! - existence resolution and account gating
//! - reconciliation and startup seeding
//! - failure isolation and lifecycle

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use upload_ledger::{
    Account, AppUploadStatus, FlakyLedger, InstalledApp, Ledger, MemoryLedger, Metadata,
    StatusKind, Upload, UploadStatus,
};
use upload_orchestrator::{
    names, Collaborators, OrchestratorConfig, UploadOrchestrator, UploaderError,
};
use upload_services::mock::{
    MockAccount, MockUploadService, RecordingBackground, StaticApps, StaticChecksum,
};

struct Device {
    uploads: Arc<MemoryLedger<Upload>>,
    statuses: Arc<FlakyLedger<AppUploadStatus>>,
    remote: Arc<MockUploadService>,
    account: Arc<MockAccount>,
    background: Arc<RecordingBackground>,
    checksums: Arc<StaticChecksum>,
    apps: Arc<StaticApps>,
}

impl Device {
    fn new(account: Account, checksums: StaticChecksum, apps: StaticApps) -> Self {
        Self {
            uploads: Arc::new(MemoryLedger::new()),
            statuses: Arc::new(FlakyLedger::new()),
            remote: Arc::new(MockUploadService::new()),
            account: Arc::new(MockAccount::with_account(account)),
            background: Arc::new(RecordingBackground::new()),
            checksums: Arc::new(checksums),
            apps: Arc::new(apps),
        }
    }

    fn signed_in(checksums: StaticChecksum) -> Self {
        Self::new(Account::authenticated("my-store"), checksums, StaticApps::default())
    }

    /// Replace the remote with one that delays every call by `latency`.
    fn with_remote_latency(mut self, latency: Duration) -> Self {
        self.remote = Arc::new(MockUploadService::new().with_latency(latency));
        self
    }

    fn orchestrator(&self, config: OrchestratorConfig) -> UploadOrchestrator {
        let collaborators = Collaborators {
            uploads: self.uploads.clone(),
            statuses: self.statuses.clone(),
            remote: self.remote.clone(),
            checksums: self.checksums.clone(),
            accounts: self.account.clone(),
            background: self.background.clone(),
            apps: self.apps.clone(),
        };
        UploadOrchestrator::with_config(collaborators, config).unwrap()
    }

    fn kind_of(&self, checksum: &str) -> Option<StatusKind> {
        self.uploads.get(checksum).map(|u| u.kind())
    }
}

fn app(package: &str, version: u64) -> InstalledApp {
    InstalledApp::new(package, version, package, format!("/data/app/{package}.apk"))
}

fn fast() -> OrchestratorConfig {
    OrchestratorConfig::default()
        .with_remote_timeout(Duration::from_millis(100))
        .with_retry_interval(Duration::from_millis(50))
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

// =============================================================================
// Upload Lifecycle
// =============================================================================

#[tokio::test]
async fn test_pending_upload_runs_to_completion() {
    let device = Device::signed_in(StaticChecksum::new().with("com.example", "m1"))
        .with_remote_latency(Duration::from_millis(10));
    let metadata = Metadata::new("Example", "en").with_category("tools");
    device.remote.script_claim("m1", UploadStatus::Pending);
    device.remote.script_submits(
        "m1",
        [UploadStatus::MetadataAdded(metadata.clone()), UploadStatus::Completed],
    );
    // The first mirror write fails, holding the upload in COMPLETED until
    // the completion pipeline retries it.
    device.statuses.fail_next_writes(1);
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    let upload = assert_ok!(
        orchestrator
            .submit_for_upload("my-store", "en", app("com.example", 4))
            .await
    );
    assert_eq!(upload.kind(), StatusKind::Pending);

    eventually("background enabled", || device.background.enable_count() >= 1).await;
    eventually("completed upload mirrored", || {
        device.statuses.get("m1").is_some_and(|s| s.uploaded)
    })
    .await;
    eventually("upload ledger drained", || device.uploads.is_empty()).await;
    eventually("background disabled", || !device.background.is_enabled()).await;

    let sent = device.remote.submitted("m1");
    assert_eq!(sent.len(), 2);
    assert!(sent[0].metadata.is_none());
    assert_eq!(sent[1].metadata.as_ref(), Some(&metadata));
    assert_eq!(device.statuses.get("m1").unwrap().version_code, 4);
    assert_eq!(device.statuses.rejected_count(), 1);
    assert!(device.background.disable_count() >= 2);

    let status = orchestrator.status().await;
    assert_eq!(status.pipeline(names::COMPLETION).unwrap().failed, 1);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_unknown_build_without_metadata_parks() {
    let device = Device::signed_in(StaticChecksum::new().with("com.example", "m1"));
    device.remote.script_claim("m1", UploadStatus::NotExistent);
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    assert_ok!(
        orchestrator
            .submit_for_upload("my-store", "en", app("com.example", 1))
            .await
    );

    eventually("no metadata", || device.kind_of("m1") == Some(StatusKind::NoMetadata)).await;
    settle().await;
    assert_eq!(device.remote.has_metadata_count(), 1);
    assert_eq!(device.remote.submit_count("m1"), 0);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_unknown_build_with_metadata_submits_binary() {
    let device = Device::signed_in(StaticChecksum::new().with("com.example", "m1"));
    device.remote.script_claim("m1", UploadStatus::NotExistent);
    device.remote.set_has_metadata("com.example", 1);
    device.remote.script_submits("m1", [UploadStatus::Completed]);
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    assert_ok!(
        orchestrator
            .submit_for_upload("upload-store", "en", app("com.example", 1))
            .await
    );

    eventually("completed", || device.statuses.get("m1").is_some_and(|s| s.uploaded)).await;
    assert_eq!(device.remote.submitted("m1")[0].store_name, "upload-store");

    orchestrator.stop().await;
}

// =============================================================================
// Account Gating
// =============================================================================

#[tokio::test]
async fn test_dispatch_waits_for_sign_in() {
    let device = Device::new(
        Account::Anonymous,
        StaticChecksum::new().with("com.example", "m1"),
        StaticApps::default(),
    );
    device.remote.script_claim("m1", UploadStatus::Pending);
    device.remote.script_submits("m1", [UploadStatus::Retry]);
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    assert_ok!(
        orchestrator
            .submit_for_upload("my-store", "en", app("com.example", 1))
            .await
    );
    settle().await;
    assert_eq!(device.remote.submit_count("m1"), 0);
    assert_eq!(device.kind_of("m1"), Some(StatusKind::Pending));

    device.account.sign_in("account-store");
    eventually("dispatched", || device.kind_of("m1") == Some(StatusKind::Retry)).await;
    assert_eq!(device.remote.submitted("m1")[0].store_name, "account-store");
    eventually("retry check issued", || device.remote.retry_count("m1") >= 1).await;

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_sign_out_stops_reconciliation() {
    let device = Device::new(
        Account::Anonymous,
        StaticChecksum::new().with("com.a", "m1"),
        StaticApps::new([app("com.a", 1)]),
    );
    device.remote.set_remote_status(AppUploadStatus::new("m1", "com.a", true, 1));
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    eventually("seeded", || device.statuses.get("m1").is_some()).await;
    settle().await;
    assert_eq!(device.remote.status_of_count(), 0);
    assert!(!device.statuses.get("m1").unwrap().uploaded);

    device.account.sign_in("my-store");
    eventually("reconciled", || device.statuses.get("m1").is_some_and(|s| s.uploaded)).await;
    settle().await;
    let queries = device.remote.status_of_count();

    device.account.sign_out();
    settle().await;
    device
        .statuses
        .upsert(AppUploadStatus::new("m2", "com.b", false, 1))
        .await
        .unwrap();
    settle().await;
    assert_eq!(device.remote.status_of_count(), queries);

    orchestrator.stop().await;
}

// =============================================================================
// Reconciliation & Seeding
// =============================================================================

#[tokio::test]
async fn test_reconcile_queries_once_per_change() {
    let device = Device::signed_in(StaticChecksum::new());
    device
        .statuses
        .upsert(AppUploadStatus::new("m1", "com.a", false, 1))
        .await
        .unwrap();
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    eventually("first query", || device.remote.status_of_count() == 1).await;
    settle().await;
    assert_eq!(device.remote.status_of_count(), 1);

    device
        .statuses
        .upsert(AppUploadStatus::new("m2", "com.b", false, 1))
        .await
        .unwrap();
    eventually("second query", || device.remote.status_of_count() == 2).await;
    settle().await;
    assert_eq!(device.remote.status_of_count(), 2);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_seeding_keeps_uploaded_flags() {
    let device = Device::new(
        Account::Anonymous,
        StaticChecksum::new().with("com.a", "m1").with("com.b", "m2"),
        StaticApps::new([app("com.a", 1), app("com.b", 1)]),
    );
    device
        .statuses
        .upsert(AppUploadStatus::new("m1", "com.a", true, 1))
        .await
        .unwrap();
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    eventually("seeded", || device.statuses.len() == 2).await;
    settle().await;
    assert!(device.statuses.get("m1").unwrap().uploaded);
    assert!(!device.statuses.get("m2").unwrap().uploaded);

    let status = orchestrator.status().await;
    let seed = status.pipeline(names::SEED).unwrap();
    assert_eq!(seed.succeeded, 1);
    assert_eq!(seed.skipped, 1);

    orchestrator.stop().await;
}

// =============================================================================
// Failure Isolation
// =============================================================================

#[tokio::test]
async fn test_hanging_record_does_not_block_others() {
    let device = Device::signed_in(StaticChecksum::new());
    device.remote.hang_checksum("m1");
    device.remote.script_submits("m2", [UploadStatus::Completed]);
    for checksum in ["m1", "m2"] {
        device
            .uploads
            .upsert(Upload::new(checksum, "my-store", app(checksum, 1), UploadStatus::Pending))
            .await
            .unwrap();
    }
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    eventually("m2 completed", || device.statuses.get("m2").is_some_and(|s| s.uploaded)).await;
    assert_eq!(device.kind_of("m1"), Some(StatusKind::Pending));

    assert!(device.remote.submit_count("m1") >= 1);

    // Past the remote deadline for m1.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let status = orchestrator.status().await;
    assert!(status.pipeline(names::DISPATCH).unwrap().failed >= 1);
    assert_eq!(device.kind_of("m1"), Some(StatusKind::Pending));

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_failed_dispatch_is_retried_after_recovery() {
    let device = Device::signed_in(StaticChecksum::new());
    device.remote.fail_checksum("m1");
    device.remote.script_submits("m1", [UploadStatus::Completed]);
    device
        .uploads
        .upsert(Upload::new("m1", "my-store", app("com.a", 1), UploadStatus::Pending))
        .await
        .unwrap();
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    eventually("first attempt", || device.remote.submit_count("m1") >= 1).await;
    assert_eq!(device.kind_of("m1"), Some(StatusKind::Pending));

    device.remote.heal_checksum("m1");
    eventually("completed after recovery", || {
        device.statuses.get("m1").is_some_and(|s| s.uploaded)
    })
    .await;
    assert!(device.uploads.is_empty());
    assert!(device.remote.submit_count("m1") >= 2);

    let status = orchestrator.status().await;
    assert!(status.pipeline(names::DISPATCH).unwrap().failed >= 1);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_unavailable_status_ledger_holds_completion() {
    let device = Device::signed_in(StaticChecksum::new());
    device.statuses.set_unavailable(true);
    device
        .uploads
        .upsert(Upload::new("m1", "my-store", app("com.a", 1), UploadStatus::Completed))
        .await
        .unwrap();
    let orchestrator = device.orchestrator(fast());
    orchestrator.start().await;

    eventually("mirror rejected", || device.statuses.rejected_count() >= 1).await;
    settle().await;
    assert_eq!(device.kind_of("m1"), Some(StatusKind::Completed));
    assert!(device.background.is_enabled());

    device.statuses.set_unavailable(false);
    eventually("mirrored", || device.statuses.get("m1").is_some_and(|s| s.uploaded)).await;
    eventually("drained", || device.uploads.is_empty()).await;

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_failed_claim_is_surfaced() {
    let device = Device::signed_in(StaticChecksum::new().with("com.example", "m1"));
    device.remote.fail_checksum("m1");
    let orchestrator = device.orchestrator(fast());

    let err = assert_err!(
        orchestrator
            .submit_for_upload("my-store", "en", app("com.example", 1))
            .await
    );
    assert!(matches!(err, UploaderError::Remote(_)));
    assert!(err.is_transient());
    assert!(device.uploads.is_empty());

    device.remote.heal_checksum("m1");
    device.remote.hang_checksum("m1");
    let err = assert_err!(
        orchestrator
            .submit_for_upload("my-store", "en", app("com.example", 1))
            .await
    );
    assert!(matches!(err, UploaderError::Timeout { operation: "claim", .. }));
    assert!(device.uploads.is_empty());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_start_is_idempotent_and_restartable() {
    let device = Device::signed_in(StaticChecksum::new().with("com.example", "m1"));
    device.remote.script_claim("m1", UploadStatus::Pending);
    device.remote.script_submits("m1", [UploadStatus::Completed]);
    let orchestrator = device.orchestrator(fast());

    orchestrator.start().await;
    let first = orchestrator.status().await.started_at;
    orchestrator.start().await;
    assert!(orchestrator.is_running().await);
    assert_eq!(orchestrator.status().await.started_at, first);

    orchestrator.stop().await;
    assert!(!orchestrator.is_running().await);
    orchestrator.stop().await;

    // Stopped: the claim lands but nothing acts on it.
    assert_ok!(
        orchestrator
            .submit_for_upload("my-store", "en", app("com.example", 1))
            .await
    );
    settle().await;
    assert_eq!(device.remote.submit_count("m1"), 0);

    orchestrator.start().await;
    eventually("completed after restart", || device.uploads.is_empty()).await;
    assert_eq!(device.remote.submit_count("m1"), 1);

    orchestrator.stop().await;
}
