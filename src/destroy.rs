//! Bulk destroy phase: delete all eligible resources with a fixed worker
//! pool, counting successes and collecting failures.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::refresh::EligibleResource;
use crate::report;
use crate::resource::Resource;

/// Upper bound on concurrent destroy calls.
pub const DESTROY_WORKERS: usize = 5;

/// Accumulated result of the destroy phase.
#[derive(Default)]
pub struct DeletionReport {
    pub deleted: usize,
    pub failures: Vec<(Resource, anyhow::Error)>,
}

/// Destroy every eligible resource. Failures are recorded per resource and
/// never stop the batch.
pub async fn destroy_all(eligible: Vec<EligibleResource>) -> DeletionReport {
    let semaphore = Arc::new(Semaphore::new(DESTROY_WORKERS));
    let mut tasks = JoinSet::new();

    for EligibleResource { resource, state } in eligible {
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let result = state.destroy().await;
            (resource, result)
        });
    }

    let mut summary = DeletionReport::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((resource, Ok(()))) => {
                report::deleted(&resource);
                summary.deleted += 1;
            }
            Ok((resource, Err(e))) => summary.failures.push((resource, e)),
            Err(e) => warn!(error = %e, "destroy task failed"),
        }
    }

    summary
}
