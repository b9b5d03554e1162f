//! Provider backends: the collaborator seams the pipeline calls into, plus
//! the shipped implementation that drives one long-lived provider subprocess
//! per profile/region pair.
//!
//! The subprocess speaks newline-delimited JSON on stdin/stdout:
//! `{"op":"refresh","type":T,"id":I}` answers with
//! `{"ok":true,"state":null}` (resource is gone) or an opaque state token;
//! `{"op":"destroy","type":T,"id":I,"state":S}` answers `{"ok":true}`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::resource::{BackendKey, Resource};

/// How long to wait for a provider process to exit after its stdin closes.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves the set of profile/region scopes argument-mode input applies to.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, profiles: &[String], regions: &[String]) -> Result<Vec<BackendKey>>;
}

/// The remote state of a resource that still exists. The only carrier of the
/// destroy capability: a resource without one of these cannot be deleted.
#[async_trait]
pub trait ResourceState: Send + Sync {
    async fn destroy(&self) -> Result<()>;
}

/// A bound backend for one profile/region pair.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Query the live state of a resource. `Ok(None)` means it no longer
    /// exists remotely.
    async fn refresh_state(&self, resource: &Resource) -> Result<Option<Arc<dyn ResourceState>>>;

    /// Release the backend. Idempotent.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait BackendPool: Send + Sync {
    /// Acquire one backend per key, or fail without leaving any running.
    async fn acquire(&self, keys: &[BackendKey]) -> Result<BackendMap>;
}

pub type BackendMap = HashMap<BackendKey, Arc<dyn Backend>>;

/// Close every backend in the map, logging rather than propagating failures.
pub async fn close_backends(backends: &BackendMap) {
    for (key, backend) in backends {
        if let Err(e) = backend.close().await {
            warn!(key = %key, error = %e, "failed to close provider backend");
        }
    }
}

/// What to do when argument-mode input names no region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingRegionPolicy {
    /// Fall back to `AWS_DEFAULT_REGION`/`AWS_REGION`, else leave the region
    /// empty and let the provider decide.
    AmbientDefault,
    /// Fail the run.
    Error,
}

/// Scope resolution from flags and ambient environment.
pub struct EnvCredentialResolver {
    policy: MissingRegionPolicy,
}

impl EnvCredentialResolver {
    pub fn new(policy: MissingRegionPolicy) -> Self {
        Self { policy }
    }

    fn fallback_regions(&self) -> Result<Vec<String>> {
        match self.policy {
            MissingRegionPolicy::AmbientDefault => Ok(vec![ambient_region().unwrap_or_default()]),
            MissingRegionPolicy::Error => {
                bail!("no region given (pass --region or unset --require-region)")
            }
        }
    }
}

fn ambient_region() -> Option<String> {
    std::env::var("AWS_DEFAULT_REGION")
        .ok()
        .filter(|r| !r.is_empty())
        .or_else(|| std::env::var("AWS_REGION").ok().filter(|r| !r.is_empty()))
}

#[async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn resolve(&self, profiles: &[String], regions: &[String]) -> Result<Vec<BackendKey>> {
        let profiles = if profiles.is_empty() {
            vec![String::new()]
        } else {
            profiles.to_vec()
        };
        let regions = if regions.is_empty() {
            self.fallback_regions()?
        } else {
            regions.to_vec()
        };

        let mut keys = Vec::with_capacity(profiles.len() * regions.len());
        for profile in &profiles {
            for region in &regions {
                keys.push(BackendKey {
                    profile: profile.clone(),
                    region: region.clone(),
                });
            }
        }
        Ok(keys)
    }
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum ProviderRequest<'a> {
    Refresh {
        #[serde(rename = "type")]
        resource_type: &'a str,
        id: &'a str,
    },
    Destroy {
        #[serde(rename = "type")]
        resource_type: &'a str,
        id: &'a str,
        state: &'a str,
    },
}

#[derive(Deserialize)]
struct ProviderResponse {
    ok: bool,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct ProviderConn {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

/// Spawns one provider process per backend key.
pub struct ProviderPool {
    command: Vec<String>,
}

impl ProviderPool {
    /// Build a pool from a provider command line, e.g. `awsrm-provider --plugin-cache ~/.awsrm`.
    pub fn new(command_line: &str) -> Result<Self> {
        let command: Vec<String> = command_line.split_whitespace().map(String::from).collect();
        if command.is_empty() {
            bail!("provider command is empty (set --provider-cmd or AWSRM_PROVIDER)");
        }
        Ok(Self { command })
    }

    async fn spawn_backend(&self, key: &BackendKey) -> Result<ProviderBackend> {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if !key.profile.is_empty() {
            cmd.env("AWS_PROFILE", &key.profile);
        }
        if !key.region.is_empty() {
            cmd.env("AWS_REGION", &key.region);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn provider command '{}'", self.command[0]))?;

        // Catch providers that die immediately (bad credentials, missing binary deps)
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(Some(status)) = child.try_wait() {
            bail!("provider for {key} exited during startup with {status}");
        }

        let stdin = child
            .stdin
            .take()
            .context("no stdin handle on provider process")?;
        let stdout = child
            .stdout
            .take()
            .context("no stdout handle on provider process")?;

        debug!(key = %key, "provider backend started");

        Ok(ProviderBackend {
            key: key.clone(),
            conn: Arc::new(Mutex::new(Some(ProviderConn {
                child,
                stdin,
                lines: BufReader::new(stdout).lines(),
            }))),
        })
    }
}

#[async_trait]
impl BackendPool for ProviderPool {
    async fn acquire(&self, keys: &[BackendKey]) -> Result<BackendMap> {
        let mut backends: BackendMap = HashMap::new();
        for key in keys {
            match self.spawn_backend(key).await {
                Ok(backend) => {
                    backends.insert(key.clone(), Arc::new(backend));
                }
                Err(e) => {
                    close_backends(&backends).await;
                    return Err(e);
                }
            }
        }
        Ok(backends)
    }
}

/// One provider subprocess bound to a profile/region pair.
pub struct ProviderBackend {
    key: BackendKey,
    conn: Arc<Mutex<Option<ProviderConn>>>,
}

async fn provider_call(
    conn: &Mutex<Option<ProviderConn>>,
    request: &ProviderRequest<'_>,
) -> Result<ProviderResponse> {
    let mut guard = conn.lock().await;
    let conn = guard
        .as_mut()
        .ok_or_else(|| anyhow!("provider backend already closed"))?;

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    conn.stdin
        .write_all(line.as_bytes())
        .await
        .context("failed to write to provider")?;
    conn.stdin.flush().await?;

    let reply = conn
        .lines
        .next_line()
        .await
        .context("failed to read from provider")?
        .context("provider closed its output stream")?;

    serde_json::from_str(&reply).context("malformed provider response")
}

fn provider_error(response: ProviderResponse) -> anyhow::Error {
    anyhow!(
        "{}",
        response
            .error
            .unwrap_or_else(|| "provider reported an unknown error".to_string())
    )
}

#[async_trait]
impl Backend for ProviderBackend {
    async fn refresh_state(&self, resource: &Resource) -> Result<Option<Arc<dyn ResourceState>>> {
        let response = provider_call(
            &self.conn,
            &ProviderRequest::Refresh {
                resource_type: &resource.resource_type,
                id: &resource.id,
            },
        )
        .await?;

        if !response.ok {
            return Err(provider_error(response));
        }

        match response.state {
            None => Ok(None),
            Some(token) => Ok(Some(Arc::new(ProviderState {
                conn: Arc::clone(&self.conn),
                resource: resource.clone(),
                token,
            }))),
        }
    }

    async fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().await.take() else {
            return Ok(());
        };
        let ProviderConn {
            mut child, stdin, ..
        } = conn;

        // Closing stdin signals the provider to shut down
        drop(stdin);
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(key = %self.key, %status, "provider backend exited");
            }
            Err(_) => {
                warn!(key = %self.key, "provider did not exit in time, killing");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

/// Opaque state token handed back by a refresh; carries the destroy call.
struct ProviderState {
    conn: Arc<Mutex<Option<ProviderConn>>>,
    resource: Resource,
    token: String,
}

#[async_trait]
impl ResourceState for ProviderState {
    async fn destroy(&self) -> Result<()> {
        let response = provider_call(
            &self.conn,
            &ProviderRequest::Destroy {
                resource_type: &self.resource.resource_type,
                id: &self.resource.id,
                state: &self.token,
            },
        )
        .await?;

        if !response.ok {
            return Err(provider_error(response));
        }
        Ok(())
    }
}
