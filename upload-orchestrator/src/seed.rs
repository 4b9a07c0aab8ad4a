//! One-shot startup seeding of the app-status ledger.

use std::sync::Arc;

use futures::{stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use upload_ledger::{AppUploadStatus, InstalledApp};

use crate::error::Result;
use crate::pipeline::Context;
use crate::status::PipelineStats;

/// Whether `app` (checksummed as `checksum`) already has a status record.
fn is_represented(existing: &[AppUploadStatus], checksum: &str, app: &InstalledApp) -> bool {
    existing.iter().any(|s| {
        s.checksum == checksum || app.same_build(&s.package_name, s.version_code)
    })
}

/// Run the seeding pass unless `shutdown` fires first.
pub(crate) async fn run_seed(
    ctx: Arc<Context>,
    stats: Arc<PipelineStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = shutdown.changed() => {
            debug!(pipeline = stats.name(), "Seeding interrupted");
        }
        result = seed(&ctx, &stats) => match result {
            Ok(seeded) => info!(pipeline = stats.name(), seeded, "Seeding finished"),
            Err(e) => warn!(pipeline = stats.name(), error = %e, "Seeding failed"),
        },
    }
}

/// Add an `uploaded=false` record for every installed app not yet known.
/// Returns how many records were written.
async fn seed(ctx: &Context, stats: &PipelineStats) -> Result<usize> {
    let apps = ctx.services.apps.list_non_system_apps().await?;
    debug!(pipeline = stats.name(), apps = apps.len(), "Seeding app statuses");

    let checksums = Arc::clone(&ctx.services.checksums);
    let mut computed = stream::iter(apps)
        .map(move |app| {
            let checksums = Arc::clone(&checksums);
            async move {
                let checksum = checksums.compute(&app).await;
                (app, checksum)
            }
        })
        .buffer_unordered(ctx.config.seed_concurrency);

    let mut seeded = 0;
    while let Some((app, checksum)) = computed.next().await {
        let checksum = match checksum {
            Ok(checksum) => checksum,
            Err(e) => {
                stats.record_failure();
                warn!(
                    pipeline = stats.name(),
                    package = %app.package_name,
                    error = %e,
                    "Checksum failed, app skipped"
                );
                continue;
            }
        };

        // Re-read per app: other pipelines may have written since the last one.
        let existing = ctx.services.statuses.snapshot().await;
        if is_represented(&existing, &checksum, &app) {
            stats.record_skip();
            continue;
        }

        ctx.services
            .statuses
            .upsert(AppUploadStatus::pending(checksum, &app))
            .await?;
        stats.record_success();
        seeded += 1;
    }

    Ok(seeded)
}
