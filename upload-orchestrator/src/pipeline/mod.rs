//! Reactive pipelines over the upload and app-status ledgers.
//!
//! Every pipeline subscribes to a ledger on its own and reacts independently:
//!
//! ```text
//!                 ┌──────────────── upload ledger ────────────────┐
//!                 ▼            ▼            ▼          ▼          ▼
//!   account ─▶ dispatch    metadata    existence    retry    completion ─▶ app-status ledger
//!   gate       PENDING     METADATA_   NOT_EXISTENT RETRY    COMPLETED           │
//!                          ADDED                                                 ▼
//!                                                              account gate ─▶ reconcile
//! ```
//!
//! Status pipelines compare each snapshot with the one before it, fan out one
//! task per matching record and never act on a record that already has an
//! action running. A failed action is logged, the record is left as it was
//! and the pipeline tries it again later.

pub(crate) mod actions;
pub(crate) mod background;
pub(crate) mod reconcile;

use std::future::Future;
use std::sync::Arc;

use dashmap::DashSet;
use futures::StreamExt;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use upload_ledger::{Account, Comparison, StatusKind, Upload};
use upload_services::ServiceError;

use crate::config::OrchestratorConfig;
use crate::error::{Result, UploaderError};
use crate::orchestrator::Collaborators;
use crate::status::PipelineStats;

use actions::UploadAction;

/// Pipeline names as they appear in logs and status reports.
pub mod names {
    pub const SEED: &str = "seed";
    pub const BACKGROUND: &str = "background";
    pub const DISPATCH: &str = "dispatch";
    pub const METADATA: &str = "metadata";
    pub const EXISTENCE: &str = "existence";
    pub const RETRY: &str = "retry";
    pub const COMPLETION: &str = "completion";
    pub const RECONCILE: &str = "reconcile";
}

/// Shared, read-only state every pipeline works from.
pub(crate) struct Context {
    pub(crate) services: Collaborators,
    pub(crate) config: OrchestratorConfig,
}

impl Context {
    pub(crate) fn new(services: Collaborators, config: OrchestratorConfig) -> Self {
        Self { services, config }
    }

    /// Run a remote call under the configured deadline.
    pub(crate) async fn remote<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.config.remote_timeout(), call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(UploaderError::Timeout {
                operation,
                after_ms: self.config.remote_timeout_ms,
            }),
        }
    }
}

/// Marks a checksum as having an action running; released on drop.
struct InFlight {
    set: Arc<DashSet<String>>,
    key: String,
}

impl InFlight {
    fn claim(set: &Arc<DashSet<String>>, key: &str) -> Option<Self> {
        set.insert(key.to_string()).then(|| Self {
            set: Arc::clone(set),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

/// Records a pipeline owes another attempt: the action failed, or the record
/// was matched while an earlier action for it was still running.
#[derive(Default)]
struct Owed(DashSet<String>);

impl Owed {
    fn mark(&self, checksum: &str) {
        self.0.insert(checksum.to_string());
    }

    fn clear(&self, checksum: &str) {
        self.0.remove(checksum);
    }

    fn contains(&self, checksum: &str) -> bool {
        self.0.contains(checksum)
    }

    /// Forget records that no longer sit in `trigger`.
    fn prune(&self, snapshot: &[Upload], trigger: StatusKind) {
        self.0.retain(|checksum| {
            snapshot
                .iter()
                .any(|u| u.checksum == *checksum && u.kind() == trigger)
        });
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// React to every upload whose status matches `action.trigger()`.
///
/// A changed snapshot fans out every matching record. Records whose action
/// failed or was skipped are owed another attempt: they go again on the next
/// emission of any kind and on every retry tick, for as long as they stay in
/// the trigger status.
///
/// Runs until `shutdown` fires or the ledger stream ends. Outstanding actions
/// are aborted on exit.
pub(crate) async fn run_status_pipeline(
    ctx: Arc<Context>,
    action: Arc<dyn UploadAction>,
    stats: Arc<PipelineStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let trigger = action.trigger();
    let mut snapshots = ctx.services.uploads.observe();
    let mut previous: Option<Vec<Upload>> = None;
    let owed = Arc::new(Owed::default());
    let in_flight: Arc<DashSet<String>> = Arc::new(DashSet::new());
    let permits = Arc::new(Semaphore::new(ctx.config.max_concurrent_actions));
    let mut tasks = JoinSet::new();
    let mut retry_tick = tokio::time::interval(ctx.config.retry_interval());
    retry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(pipeline = stats.name(), %trigger, "Pipeline started");

    loop {
        let due: Vec<Upload> = tokio::select! {
            _ = shutdown.changed() => break,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(pipeline = stats.name(), error = %e, "Action task panicked");
                    }
                }
                continue;
            }
            _ = retry_tick.tick() => {
                if owed.is_empty() {
                    continue;
                }
                let snapshot = ctx.services.uploads.snapshot().await;
                owed.prune(&snapshot, trigger);
                snapshot
                    .into_iter()
                    .filter(|u| u.kind() == trigger && owed.contains(&u.checksum))
                    .collect()
            }
            next = snapshots.next() => {
                let Some(snapshot) = next else {
                    warn!(pipeline = stats.name(), "Upload ledger stream ended");
                    break;
                };
                let changed = previous
                    .as_deref()
                    .map_or(true, |before| Comparison::Full.has_changed(before, &snapshot));
                owed.prune(&snapshot, trigger);
                let due: Vec<Upload> = snapshot
                    .iter()
                    .filter(|u| u.kind() == trigger && (changed || owed.contains(&u.checksum)))
                    .cloned()
                    .collect();
                previous = Some(snapshot);
                due
            }
        };

        for upload in due {
            let Some(claim) = InFlight::claim(&in_flight, &upload.checksum) else {
                owed.mark(&upload.checksum);
                stats.record_skip();
                debug!(pipeline = stats.name(), checksum = %upload.checksum, "Action already running");
                continue;
            };

            let action = Arc::clone(&action);
            let stats = Arc::clone(&stats);
            let permits = Arc::clone(&permits);
            let owed = Arc::clone(&owed);
            tasks.spawn(async move {
                let _claim = claim;
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let checksum = upload.checksum.clone();
                owed.clear(&checksum);

                match action.act(upload).await {
                    Ok(()) => {
                        stats.record_success();
                        debug!(pipeline = stats.name(), %checksum, "Action completed");
                    }
                    Err(e) => {
                        owed.mark(&checksum);
                        stats.record_failure();
                        warn!(
                            pipeline = stats.name(),
                            %checksum,
                            error = %e,
                            transient = e.is_transient(),
                            "Action failed, will retry"
                        );
                    }
                }
            });
        }
    }

    tasks.shutdown().await;
    info!(pipeline = stats.name(), "Pipeline stopped");
}

/// Run `session` only while an account is authenticated.
///
/// Each distinct account emission cancels the running session. An
/// authenticated account starts a new one bound to its store name; an
/// anonymous account leaves the pipeline idle.
pub(crate) async fn run_account_gated<F, Fut>(
    ctx: Arc<Context>,
    name: &'static str,
    mut shutdown: watch::Receiver<bool>,
    session: F,
) where
    F: Fn(String, watch::Receiver<bool>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut accounts = ctx.services.accounts.observe();
    let mut accounts_open = true;
    let mut last: Option<Account> = None;
    let mut current: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = accounts.next(), if accounts_open => {
                let Some(account) = next else {
                    debug!(pipeline = name, "Account stream ended, keeping current session");
                    accounts_open = false;
                    continue;
                };
                if last.as_ref() == Some(&account) {
                    continue;
                }
                last = Some(account.clone());

                if let Some(previous) = current.take() {
                    cancel(previous).await;
                }

                match account {
                    Account::Authenticated { store_name } => {
                        info!(pipeline = name, store = %store_name, "Account authenticated, session started");
                        current = Some(tokio::spawn(session(store_name, shutdown.clone())));
                    }
                    Account::Anonymous => {
                        info!(pipeline = name, "No authenticated account, pipeline idle");
                    }
                }
            }
        }
    }

    if let Some(session) = current.take() {
        cancel(session).await;
    }
}

async fn cancel(handle: JoinHandle<()>) {
    handle.abort();
    if let Err(e) = handle.await {
        if e.is_panic() {
            error!(error = %e, "Session panicked");
        }
    }
}
