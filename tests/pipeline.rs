//! End-to-end pipeline tests against mock provider collaborators.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use awsrm::pipeline::{ConfirmSource, PipelineOpts, RunStatus, run};
use awsrm::pool::{Backend, BackendMap, BackendPool, ResourceState};
use awsrm::resource::{BackendKey, Resource};

#[derive(Clone, Copy)]
enum Scripted {
    Exists,
    Absent,
    RefreshError,
    DestroyFails,
}

struct MockPool {
    states: Arc<HashMap<String, Scripted>>,
    destroyed: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
    fail_acquire: bool,
}

impl MockPool {
    fn new(states: &[(&str, Scripted)]) -> Self {
        Self {
            states: Arc::new(
                states
                    .iter()
                    .map(|(id, s)| (id.to_string(), *s))
                    .collect(),
            ),
            destroyed: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicUsize::new(0)),
            fail_acquire: false,
        }
    }

    fn failing_acquire() -> Self {
        let mut pool = Self::new(&[]);
        pool.fail_acquire = true;
        pool
    }

    fn destroyed_ids(&self) -> Vec<String> {
        let mut ids = self.destroyed.lock().unwrap().clone();
        ids.sort();
        ids
    }
}

#[async_trait]
impl BackendPool for MockPool {
    async fn acquire(&self, keys: &[BackendKey]) -> Result<BackendMap> {
        if self.fail_acquire {
            bail!("could not start provider");
        }
        let mut backends: BackendMap = HashMap::new();
        for key in keys {
            backends.insert(
                key.clone(),
                Arc::new(MockBackend {
                    states: Arc::clone(&self.states),
                    destroyed: Arc::clone(&self.destroyed),
                    closed: Arc::clone(&self.closed),
                }),
            );
        }
        Ok(backends)
    }
}

struct MockBackend {
    states: Arc<HashMap<String, Scripted>>,
    destroyed: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl Backend for MockBackend {
    async fn refresh_state(&self, resource: &Resource) -> Result<Option<Arc<dyn ResourceState>>> {
        match self.states.get(&resource.id) {
            Some(Scripted::Exists) => Ok(Some(Arc::new(MockState {
                id: resource.id.clone(),
                fail: false,
                destroyed: Arc::clone(&self.destroyed),
            }))),
            Some(Scripted::DestroyFails) => Ok(Some(Arc::new(MockState {
                id: resource.id.clone(),
                fail: true,
                destroyed: Arc::clone(&self.destroyed),
            }))),
            Some(Scripted::Absent) => Ok(None),
            Some(Scripted::RefreshError) | None => bail!("api error for {}", resource.id),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockState {
    id: String,
    fail: bool,
    destroyed: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ResourceState for MockState {
    async fn destroy(&self) -> Result<()> {
        if self.fail {
            bail!("destroy failed for {}", self.id);
        }
        self.destroyed.lock().unwrap().push(self.id.clone());
        Ok(())
    }
}

fn resource(id: &str) -> Resource {
    Resource {
        resource_type: "aws_vpc".to_string(),
        id: id.to_string(),
        profile: "myprofile".to_string(),
        region: "us-east-1".to_string(),
    }
}

fn answer(text: &str) -> ConfirmSource {
    ConfirmSource::Reader(Box::new(Cursor::new(text.as_bytes().to_vec())))
}

fn opts(dry_run: bool, force: bool) -> PipelineOpts {
    PipelineOpts { dry_run, force }
}

#[tokio::test]
async fn absent_resources_yield_nothing_to_delete() {
    let pool = MockPool::new(&[("vpc-111", Scripted::Absent)]);
    let status = run(
        vec![resource("vpc-111")],
        &pool,
        answer("yes\n"),
        opts(false, false),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::NothingToDelete);
    assert!(pool.destroyed_ids().is_empty());
    assert_eq!(pool.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn force_deletes_without_reading_confirmation() {
    let pool = MockPool::new(&[("vpc-111", Scripted::Exists)]);
    let status = run(
        vec![resource("vpc-111")],
        &pool,
        answer("no\n"),
        opts(false, true),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Completed { deleted: 1 });
    assert_eq!(pool.destroyed_ids(), vec!["vpc-111"]);
}

#[tokio::test]
async fn mixed_batch_deletes_only_eligible_after_yes() {
    let pool = MockPool::new(&[
        ("vpc-1", Scripted::Exists),
        ("vpc-2", Scripted::Absent),
        ("vpc-3", Scripted::Exists),
    ]);
    let status = run(
        vec![resource("vpc-1"), resource("vpc-2"), resource("vpc-3")],
        &pool,
        answer("yes\n"),
        opts(false, false),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Completed { deleted: 2 });
    assert_eq!(pool.destroyed_ids(), vec!["vpc-1", "vpc-3"]);
}

#[tokio::test]
async fn declined_confirmation_deletes_nothing() {
    let pool = MockPool::new(&[("vpc-111", Scripted::Exists)]);
    let status = run(
        vec![resource("vpc-111")],
        &pool,
        answer("no\n"),
        opts(false, false),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Declined);
    assert!(pool.destroyed_ids().is_empty());
    assert_eq!(pool.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_answer_declines() {
    let pool = MockPool::new(&[("vpc-111", Scripted::Exists)]);
    let status = run(
        vec![resource("vpc-111")],
        &pool,
        answer(""),
        opts(false, false),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Declined);
    assert!(pool.destroyed_ids().is_empty());
}

#[tokio::test]
async fn dry_run_overrides_force() {
    let pool = MockPool::new(&[("vpc-111", Scripted::Exists)]);
    let status = run(
        vec![resource("vpc-111")],
        &pool,
        answer("yes\n"),
        opts(true, true),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::DryRun);
    assert!(pool.destroyed_ids().is_empty());
}

#[tokio::test]
async fn refresh_error_does_not_abort_siblings() {
    let pool = MockPool::new(&[
        ("vpc-ok", Scripted::Exists),
        ("vpc-broken", Scripted::RefreshError),
    ]);
    let status = run(
        vec![resource("vpc-ok"), resource("vpc-broken")],
        &pool,
        answer("yes\n"),
        opts(false, true),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Completed { deleted: 1 });
    assert_eq!(pool.destroyed_ids(), vec!["vpc-ok"]);
}

#[tokio::test]
async fn destroy_failure_counts_only_successes() {
    let pool = MockPool::new(&[
        ("vpc-ok", Scripted::Exists),
        ("vpc-stuck", Scripted::DestroyFails),
    ]);
    let status = run(
        vec![resource("vpc-ok"), resource("vpc-stuck")],
        &pool,
        answer("yes\n"),
        opts(false, true),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Completed { deleted: 1 });
    assert_eq!(pool.destroyed_ids(), vec!["vpc-ok"]);
}

#[tokio::test]
async fn binding_failure_is_fatal_before_any_refresh() {
    let pool = MockPool::failing_acquire();
    let result = run(
        vec![resource("vpc-111")],
        &pool,
        answer("yes\n"),
        opts(false, false),
        CancellationToken::new(),
    )
    .await;

    assert!(result.is_err());
    assert!(pool.destroyed_ids().is_empty());
}

#[tokio::test]
async fn cancelled_token_interrupts_without_acquiring() {
    let pool = MockPool::new(&[("vpc-111", Scripted::Exists)]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let status = run(
        vec![resource("vpc-111")],
        &pool,
        answer("yes\n"),
        opts(false, false),
        cancel,
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Interrupted);
    assert!(pool.destroyed_ids().is_empty());
}

#[tokio::test]
async fn one_backend_per_scope_and_all_released() {
    let pool = MockPool::new(&[("vpc-1", Scripted::Exists), ("vpc-2", Scripted::Exists)]);
    let mut other_scope = resource("vpc-2");
    other_scope.region = "eu-west-1".to_string();

    let status = run(
        vec![resource("vpc-1"), other_scope],
        &pool,
        answer("yes\n"),
        opts(false, false),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Completed { deleted: 2 });
    assert_eq!(pool.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rerun_after_deletion_finds_nothing() {
    let pool = MockPool::new(&[("vpc-111", Scripted::Exists)]);
    let status = run(
        vec![resource("vpc-111")],
        &pool,
        answer("yes\n"),
        opts(false, true),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(status, RunStatus::Completed { deleted: 1 });

    // The listing now refreshes to absent
    let pool = MockPool::new(&[("vpc-111", Scripted::Absent)]);
    let status = run(
        vec![resource("vpc-111")],
        &pool,
        answer("yes\n"),
        opts(false, true),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    assert_eq!(status, RunStatus::NothingToDelete);
    assert!(pool.destroyed_ids().is_empty());
}
