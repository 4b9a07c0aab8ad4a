//! Reconciliation of local "uploaded" flags against the remote.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use upload_ledger::{distinct, AppUploadStatus};

use super::Context;
use crate::error::Result;
use crate::status::PipelineStats;

/// One reconciliation session, run while an account is authenticated.
///
/// Every changed app-status snapshot triggers exactly one bulk status query.
pub(crate) async fn run_reconcile_session(
    ctx: Arc<Context>,
    stats: Arc<PipelineStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut snapshots = distinct(
        ctx.services.statuses.observe(),
        ctx.config.reconcile_comparison,
    );
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        error!(pipeline = stats.name(), error = %e, "Reconcile task panicked");
                    }
                }
            }
            next = snapshots.next() => {
                let Some(snapshot) = next else { break };
                if snapshot.is_empty() {
                    debug!(pipeline = stats.name(), "Nothing to reconcile");
                    continue;
                }

                let ctx = Arc::clone(&ctx);
                let stats = Arc::clone(&stats);
                tasks.spawn(async move {
                    match reconcile(&ctx, snapshot).await {
                        Ok(updated) => {
                            stats.record_success();
                            debug!(pipeline = stats.name(), updated, "Reconciled app statuses");
                        }
                        Err(e) => {
                            stats.record_failure();
                            warn!(pipeline = stats.name(), error = %e, "Reconciliation failed");
                        }
                    }
                });
            }
        }
    }

    tasks.shutdown().await;
}

/// Query remote truth for every checksum in `local` and write back the
/// records that differ. Returns how many were written.
async fn reconcile(ctx: &Context, local: Vec<AppUploadStatus>) -> Result<usize> {
    let checksums: Vec<String> = local.iter().map(|s| s.checksum.clone()).collect();
    let remote = ctx
        .remote("status_of", ctx.services.remote.status_of(&checksums))
        .await?;

    let known: HashMap<&str, &AppUploadStatus> =
        local.iter().map(|s| (s.checksum.as_str(), s)).collect();

    let mut updated = 0;
    for status in remote {
        if known.get(status.checksum.as_str()) == Some(&&status) {
            continue;
        }
        ctx.services.statuses.upsert(status).await?;
        updated += 1;
    }
    Ok(updated)
}
