use std::sync::Arc;

use newsletter_tracking::{SnapshotScope, Tracking, snapshot::yesterday};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::SchedulerConfig;

/// Cron jobs for revocation pruning and the nightly global snapshot.
/// The returned scheduler is not started yet.
pub async fn scheduler(
    config: &SchedulerConfig,
    tracking: Arc<Tracking>,
) -> Result<JobScheduler, JobSchedulerError> {
    let sched = JobScheduler::new().await?;

    let prune_tracking = tracking.clone();
    sched
        .add(Job::new_async(
            config.prune_cron.as_str(),
            move |uuid, mut l| {
                let tracking = prune_tracking.clone();

                Box::pin(async move {
                    if let Err(err) = tracking.revocations.prune().await {
                        tracing::error!(err = %err, "failed to prune revoked tokens");
                    }

                    if let Err(err) = l.next_tick_for_job(uuid).await {
                        tracing::error!(err = %err, "failed to get next tick for revocation prune");
                    }
                })
            },
        )?)
        .await?;

    sched
        .add(Job::new_async(
            config.snapshot_cron.as_str(),
            move |uuid, mut l| {
                let tracking = tracking.clone();

                Box::pin(async move {
                    if let Err(err) = snapshot_yesterday(&tracking).await {
                        tracing::error!(err = %err, "failed to regenerate daily snapshots");
                    }

                    if let Err(err) = l.next_tick_for_job(uuid).await {
                        tracing::error!(err = %err, "failed to get next tick for daily snapshots");
                    }
                })
            },
        )?)
        .await?;

    Ok(sched)
}

/// Regenerates the unscoped snapshots of the previous UTC day.
pub async fn snapshot_yesterday(tracking: &Tracking) -> newsletter_tracking::Result<usize> {
    let day = yesterday(tracking.clock())?;
    let snapshots = tracking
        .snapshots
        .regenerate(day, day, &SnapshotScope::default())
        .await?;

    Ok(snapshots.len())
}
