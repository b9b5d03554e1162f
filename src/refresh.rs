//! Concurrent state refresh and classification.
//!
//! Every descriptor is refreshed through its bound backend; results are
//! partitioned into resources that are already gone and resources still
//! eligible for deletion. One resource's failure never cancels its siblings.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::pool::{BackendMap, ResourceState};
use crate::report;
use crate::resource::Resource;

/// Upper bound on concurrent refresh calls.
pub const REFRESH_WORKERS: usize = 10;

/// A resource whose refreshed state proves it still exists. Owning one is the
/// only way to reach the destroy call.
pub struct EligibleResource {
    pub resource: Resource,
    pub state: Arc<dyn ResourceState>,
}

/// Partitioned result of a refresh pass. Produced once per run.
pub struct RefreshOutcome {
    pub already_absent: Vec<Resource>,
    pub eligible: Vec<EligibleResource>,
    pub errors: Vec<(Resource, anyhow::Error)>,
}

/// Refresh all resources with bounded concurrency and classify them.
///
/// Logs the "don't exist" block before returning so it always precedes the
/// to-delete listing.
pub async fn refresh_all(resources: Vec<Resource>, backends: &BackendMap) -> RefreshOutcome {
    let semaphore = Arc::new(Semaphore::new(REFRESH_WORKERS));
    let mut tasks = JoinSet::new();
    let mut errors: Vec<(Resource, anyhow::Error)> = Vec::new();

    for resource in resources {
        let Some(backend) = backends.get(&resource.key()).map(Arc::clone) else {
            errors.push((
                resource,
                anyhow!("no backend bound for this profile/region"),
            ));
            continue;
        };
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let state = backend.refresh_state(&resource).await;
            (resource, state)
        });
    }

    let mut already_absent = Vec::new();
    let mut eligible = Vec::new();

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((resource, Ok(Some(state)))) => {
                eligible.push(EligibleResource { resource, state })
            }
            Ok((resource, Ok(None))) => already_absent.push(resource),
            Ok((resource, Err(e))) => errors.push((resource, e)),
            Err(e) => warn!(error = %e, "state refresh task failed"),
        }
    }

    if !already_absent.is_empty() {
        report::title("the following resources don't exist");
        for resource in &already_absent {
            report::absent(resource);
        }
    }

    RefreshOutcome {
        already_absent,
        eligible,
        errors,
    }
}
