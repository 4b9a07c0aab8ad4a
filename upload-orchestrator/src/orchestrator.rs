//! The orchestrator handle: submission entry point and pipeline lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use upload_ledger::{AppStatusLedger, InstalledApp, SnapshotStream, Upload, UploadLedger};
use upload_services::{
    AccountProvider, AppEnumerator, BackgroundCapability, ChecksumService, ClaimRequest,
    UploadService,
};

use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::pipeline::actions::{
    Complete, Dispatch, ResolveExistence, RetryCheck, SubmitMetadata, UploadAction,
};
use crate::pipeline::{
    background, names, reconcile, run_account_gated, run_status_pipeline, Context,
};
use crate::seed;
use crate::status::{OrchestratorStatus, PipelineStats};

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Ledger of in-flight uploads
    pub uploads: Arc<UploadLedger>,
    /// Ledger of per-app upload flags
    pub statuses: Arc<AppStatusLedger>,
    pub remote: Arc<dyn UploadService>,
    pub checksums: Arc<dyn ChecksumService>,
    pub accounts: Arc<dyn AccountProvider>,
    pub background: Arc<dyn BackgroundCapability>,
    pub apps: Arc<dyn AppEnumerator>,
}

/// Counters per pipeline, kept across restarts.
struct Stats {
    seed: Arc<PipelineStats>,
    background: Arc<PipelineStats>,
    dispatch: Arc<PipelineStats>,
    metadata: Arc<PipelineStats>,
    existence: Arc<PipelineStats>,
    retry: Arc<PipelineStats>,
    completion: Arc<PipelineStats>,
    reconcile: Arc<PipelineStats>,
}

impl Stats {
    fn new() -> Self {
        Self {
            seed: Arc::new(PipelineStats::new(names::SEED)),
            background: Arc::new(PipelineStats::new(names::BACKGROUND)),
            dispatch: Arc::new(PipelineStats::new(names::DISPATCH)),
            metadata: Arc::new(PipelineStats::new(names::METADATA)),
            existence: Arc::new(PipelineStats::new(names::EXISTENCE)),
            retry: Arc::new(PipelineStats::new(names::RETRY)),
            completion: Arc::new(PipelineStats::new(names::COMPLETION)),
            reconcile: Arc::new(PipelineStats::new(names::RECONCILE)),
        }
    }

    fn all(&self) -> [&Arc<PipelineStats>; 8] {
        [
            &self.seed,
            &self.background,
            &self.dispatch,
            &self.metadata,
            &self.existence,
            &self.retry,
            &self.completion,
            &self.reconcile,
        ]
    }
}

/// A started set of pipelines.
struct Running {
    shutdown: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
    started_at: DateTime<Utc>,
}

/// Drives uploads from claim to completion.
///
/// Created idle. [`start`](Self::start) seeds the app-status ledger and
/// starts every pipeline; [`stop`](Self::stop) tears them down again.
/// Dropping a running orchestrator also stops its pipelines.
pub struct UploadOrchestrator {
    ctx: Arc<Context>,
    stats: Stats,
    run: Mutex<Option<Running>>,
}

impl UploadOrchestrator {
    /// Create an orchestrator with default configuration.
    pub fn new(collaborators: Collaborators) -> Self {
        Self::build(collaborators, OrchestratorConfig::default())
    }

    /// Create an orchestrator with `config`.
    pub fn with_config(collaborators: Collaborators, config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(collaborators, config))
    }

    fn build(collaborators: Collaborators, config: OrchestratorConfig) -> Self {
        Self {
            ctx: Arc::new(Context::new(collaborators, config)),
            stats: Stats::new(),
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.ctx.config
    }

    /// Claim `app` for upload to `store_name` and record it in the upload
    /// ledger. Returns the recorded upload.
    pub async fn submit_for_upload(
        &self,
        store_name: impl Into<String>,
        language: impl Into<String>,
        app: InstalledApp,
    ) -> Result<Upload> {
        let services = &self.ctx.services;
        let checksum = services.checksums.compute(&app).await?;

        let request = ClaimRequest {
            checksum,
            language: language.into(),
            store_name: store_name.into(),
            app,
        };
        let upload = self.ctx.remote("claim", services.remote.claim(request)).await?;
        services.uploads.upsert(upload.clone()).await?;

        info!(
            checksum = %upload.checksum,
            package = %upload.installed_app.package_name,
            status = %upload.kind(),
            "Upload claimed"
        );
        Ok(upload)
    }

    /// Snapshots of the upload ledger.
    pub fn observe_uploads(&self) -> SnapshotStream<Upload> {
        self.ctx.services.uploads.observe()
    }

    /// Start seeding and every pipeline. Does nothing if already running.
    pub async fn start(&self) {
        let mut run = self.run.lock().await;
        if run.is_some() {
            debug!("Upload orchestrator already running");
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let ctx = &self.ctx;
        let stats = &self.stats;
        let mut handles = Vec::with_capacity(8);

        handles.push((
            names::SEED,
            tokio::spawn(seed::run_seed(
                Arc::clone(ctx),
                Arc::clone(&stats.seed),
                shutdown_rx.clone(),
            )),
        ));
        handles.push((
            names::BACKGROUND,
            tokio::spawn(background::run_background_toggle(
                Arc::clone(ctx),
                Arc::clone(&stats.background),
                shutdown_rx.clone(),
            )),
        ));

        let status_pipelines: [(&'static str, Arc<dyn UploadAction>, &Arc<PipelineStats>); 4] = [
            (names::METADATA, Arc::new(SubmitMetadata::new(Arc::clone(ctx))), &stats.metadata),
            (names::EXISTENCE, Arc::new(ResolveExistence::new(Arc::clone(ctx))), &stats.existence),
            (names::RETRY, Arc::new(RetryCheck::new(Arc::clone(ctx))), &stats.retry),
            (names::COMPLETION, Arc::new(Complete::new(Arc::clone(ctx))), &stats.completion),
        ];
        for (name, action, pipeline_stats) in status_pipelines {
            handles.push((
                name,
                tokio::spawn(run_status_pipeline(
                    Arc::clone(ctx),
                    action,
                    Arc::clone(pipeline_stats),
                    shutdown_rx.clone(),
                )),
            ));
        }

        let session_ctx = Arc::clone(ctx);
        let dispatch_stats = Arc::clone(&stats.dispatch);
        handles.push((
            names::DISPATCH,
            tokio::spawn(run_account_gated(
                Arc::clone(ctx),
                names::DISPATCH,
                shutdown_rx.clone(),
                move |store_name, shutdown| {
                    let action: Arc<dyn UploadAction> =
                        Arc::new(Dispatch::new(Arc::clone(&session_ctx), store_name));
                    run_status_pipeline(
                        Arc::clone(&session_ctx),
                        action,
                        Arc::clone(&dispatch_stats),
                        shutdown,
                    )
                },
            )),
        ));

        let session_ctx = Arc::clone(ctx);
        let reconcile_stats = Arc::clone(&stats.reconcile);
        handles.push((
            names::RECONCILE,
            tokio::spawn(run_account_gated(
                Arc::clone(ctx),
                names::RECONCILE,
                shutdown_rx,
                move |_store_name, shutdown| {
                    reconcile::run_reconcile_session(
                        Arc::clone(&session_ctx),
                        Arc::clone(&reconcile_stats),
                        shutdown,
                    )
                },
            )),
        ));

        info!(pipelines = handles.len(), "Upload orchestrator started");
        *run = Some(Running {
            shutdown,
            handles,
            started_at: Utc::now(),
        });
    }

    /// Stop every pipeline and wait for them to finish. Does nothing if not
    /// running. The orchestrator can be started again afterwards.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(running) = run.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        for (name, handle) in running.handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(pipeline = name, error = %e, "Pipeline panicked");
                }
            }
        }
        info!("Upload orchestrator stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.run.lock().await.is_some()
    }

    /// Current run state and per-pipeline counters.
    pub async fn status(&self) -> OrchestratorStatus {
        let run = self.run.lock().await;
        OrchestratorStatus {
            running: run.is_some(),
            started_at: run.as_ref().map(|r| r.started_at),
            pipelines: self.stats.all().iter().map(|s| s.report()).collect(),
        }
    }
}
