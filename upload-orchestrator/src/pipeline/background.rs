//! Background-execution toggle.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::info;

use upload_ledger::{StatusKind, Upload};

use super::Context;
use crate::status::PipelineStats;

/// Whether the background capability should be on for `snapshot`.
///
/// Keyed on `COMPLETED` records so the capability stays on until cleanup has
/// drained them.
pub(crate) fn wants_background(snapshot: &[Upload]) -> bool {
    snapshot.iter().any(|u| u.kind() == StatusKind::Completed)
}

/// Enable or disable background execution as the wanted state changes.
///
/// Reads every emission (no change gate) but only calls the capability when
/// the wanted state differs from the last one applied. The first emission
/// always applies.
pub(crate) async fn run_background_toggle(
    ctx: Arc<Context>,
    stats: Arc<PipelineStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut snapshots = ctx.services.uploads.observe();
    let mut applied: Option<bool> = None;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            next = snapshots.next() => {
                let Some(snapshot) = next else { break };
                let wanted = wants_background(&snapshot);
                if applied == Some(wanted) {
                    continue;
                }

                if wanted {
                    ctx.services.background.enable().await;
                    info!("Background execution enabled");
                } else {
                    ctx.services.background.disable().await;
                    info!("Background execution disabled");
                }
                applied = Some(wanted);
                stats.record_success();
            }
        }
    }

    info!(pipeline = stats.name(), "Pipeline stopped");
}
