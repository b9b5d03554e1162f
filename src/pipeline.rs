//! End-to-end deletion pipeline: bind backends, refresh and classify,
//! report, confirm, destroy, report totals.
//!
//! A `CancellationToken` races every blocking stage; whatever happens,
//! acquired backends are released exactly once before returning.

use std::io::BufRead;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::confirm;
use crate::destroy;
use crate::pool::{self, BackendMap, BackendPool};
use crate::refresh;
use crate::report;
use crate::resource::{Resource, backend_keys};

/// Where the confirmation gate reads its answer from.
pub enum ConfirmSource {
    /// An already-open reader (stdin in argument mode, fixed input in tests).
    Reader(Box<dyn BufRead + Send>),
    /// Open the controlling terminal when (and only if) the gate is reached.
    /// Used in pipe mode, where stdin is exhausted by ingestion.
    ControllingTty,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOpts {
    pub dry_run: bool,
    pub force: bool,
}

/// Terminal state of one pipeline run.
#[derive(Debug, PartialEq, Eq)]
pub enum RunStatus {
    Completed { deleted: usize },
    NothingToDelete,
    DryRun,
    Declined,
    Interrupted,
}

impl RunStatus {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Interrupted => 1,
            _ => 0,
        }
    }
}

/// Run the whole pipeline over the given resources.
///
/// Binding failures are fatal and surface as `Err`; everything after binding
/// resolves to a `RunStatus`.
pub async fn run(
    resources: Vec<Resource>,
    pool: &dyn BackendPool,
    confirm_source: ConfirmSource,
    opts: PipelineOpts,
    cancel: CancellationToken,
) -> Result<RunStatus> {
    let keys = backend_keys(&resources);
    let backends = match cancel.run_until_cancelled(pool.acquire(&keys)).await {
        Some(acquired) => acquired?,
        None => return Ok(RunStatus::Interrupted),
    };

    let status = execute(resources, &backends, confirm_source, opts, &cancel).await;
    pool::close_backends(&backends).await;
    status
}

async fn execute(
    resources: Vec<Resource>,
    backends: &BackendMap,
    confirm_source: ConfirmSource,
    opts: PipelineOpts,
    cancel: &CancellationToken,
) -> Result<RunStatus> {
    let outcome = match cancel
        .run_until_cancelled(refresh::refresh_all(resources, backends))
        .await
    {
        Some(outcome) => outcome,
        None => return Ok(RunStatus::Interrupted),
    };

    for (resource, error) in &outcome.errors {
        eprintln!("Error {}: {:#}", resource.resource_type, error);
    }

    if outcome.eligible.is_empty() {
        report::title("no resources found to delete");
        return Ok(RunStatus::NothingToDelete);
    }

    report::title("showing resources that would be deleted (dry run)");
    for eligible in &outcome.eligible {
        report::pending_deletion(&eligible.resource);
    }
    report::title(&format!(
        "total number of resources that would be deleted: {}",
        outcome.eligible.len()
    ));

    if opts.dry_run {
        return Ok(RunStatus::DryRun);
    }

    if opts.force {
        report::title("proceeding with deletion and skipping confirmation (force)");
    } else {
        match gate(confirm_source, cancel).await {
            Some(true) => {}
            Some(false) => return Ok(RunStatus::Declined),
            None => return Ok(RunStatus::Interrupted),
        }
    }

    report::title("starting to delete resources");
    let summary = match cancel
        .run_until_cancelled(destroy::destroy_all(outcome.eligible))
        .await
    {
        Some(summary) => summary,
        None => return Ok(RunStatus::Interrupted),
    };

    for (resource, error) in &summary.failures {
        eprintln!("Error {}: {:#}", resource.resource_type, error);
    }
    report::title(&format!(
        "total number of deleted resources: {}",
        summary.deleted
    ));

    Ok(RunStatus::Completed {
        deleted: summary.deleted,
    })
}

/// Resolve the confirmation source to a reader and ask, racing cancellation.
/// `None` means the run was cancelled mid-prompt.
async fn gate(source: ConfirmSource, cancel: &CancellationToken) -> Option<bool> {
    let mut reader: Box<dyn BufRead + Send> = match source {
        ConfirmSource::Reader(reader) => reader,
        ConfirmSource::ControllingTty => match std::fs::File::open("/dev/tty") {
            Ok(tty) => Box::new(std::io::BufReader::new(tty)),
            Err(e) => {
                warn!(error = %e, "cannot open /dev/tty for confirmation");
                return Some(false);
            }
        },
    };

    let prompt = tokio::task::spawn_blocking(move || confirm::user_confirmed_deletion(&mut *reader));
    match cancel.run_until_cancelled(prompt).await {
        Some(Ok(confirmed)) => Some(confirmed),
        Some(Err(e)) => {
            warn!(error = %e, "confirmation prompt failed");
            Some(false)
        }
        None => None,
    }
}
