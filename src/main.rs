use std::io::{self, BufReader, IsTerminal};
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use awsrm::input;
use awsrm::pipeline::{self, ConfirmSource, PipelineOpts, RunStatus};
use awsrm::pool::{CredentialResolver, EnvCredentialResolver, MissingRegionPolicy, ProviderPool};
use awsrm::resource::TypeFilter;

/// Remove AWS resources via the CLI.
///
/// Pipe input from a listing tool (`<type> <id> <profile> <region>` per line)
/// or pass a resource type followed by ids.
#[derive(Parser, Debug)]
#[command(name = "awsrm", version, about)]
struct Args {
    /// Show what would be deleted without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Delete without asking for confirmation
    #[arg(long)]
    force: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Named AWS profile for argument-mode input (default: $AWS_PROFILE, else ambient)
    #[arg(short, long)]
    profile: Option<String>,

    /// AWS region for argument-mode input (default: ambient region)
    #[arg(short, long)]
    region: Option<String>,

    /// Fail instead of falling back to an ambient default region
    #[arg(long)]
    require_region: bool,

    /// Provider command, spawned once per profile/region pair
    /// (default: $AWSRM_PROVIDER, else `awsrm-provider`)
    #[arg(long, value_name = "CMD")]
    provider_cmd: Option<String>,

    /// Resource type followed by one or more resource ids
    #[arg(value_name = "TYPE [ID...]")]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_directive = if args.debug { "awsrm=debug" } else { "awsrm=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into()),
        )
        .with_target(false)
        .init();

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            signal_cancel.cancel();
        }
        // Second interrupt terminates without waiting for cleanup
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(1);
        }
    });

    match run(args, cancel).await {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args, cancel: CancellationToken) -> Result<RunStatus> {
    let filter = type_filter()?;

    let (resources, confirm_source) = if !io::stdin().is_terminal() {
        debug!("input is from pipe");
        let resources = input::read_from_pipe(io::stdin().lock(), &filter)?;
        (resources, ConfirmSource::ControllingTty)
    } else {
        debug!("input is from arguments");
        let (rtype, ids) = input::parse_type_and_ids(&args.args, &filter)?;

        let policy = if args.require_region {
            MissingRegionPolicy::Error
        } else {
            MissingRegionPolicy::AmbientDefault
        };
        let resolver = EnvCredentialResolver::new(policy);
        let profiles = input::profiles_from(
            args.profile.as_deref(),
            std::env::var("AWS_PROFILE").ok(),
        );
        let regions: Vec<String> = args.region.clone().into_iter().collect();
        let keys = resolver.resolve(&profiles, &regions).await?;

        let resources = input::descriptors(&rtype, &ids, &keys);
        let confirm: Box<dyn io::BufRead + Send> = Box::new(BufReader::new(io::stdin()));
        (resources, ConfirmSource::Reader(confirm))
    };

    let provider_cmd = args
        .provider_cmd
        .or_else(|| std::env::var("AWSRM_PROVIDER").ok())
        .unwrap_or_else(|| "awsrm-provider".to_string());
    let pool = ProviderPool::new(&provider_cmd)?;

    let opts = PipelineOpts {
        dry_run: args.dry_run,
        force: args.force,
    };
    pipeline::run(resources, &pool, confirm_source, opts, cancel).await
}

/// The supported-type predicate. `AWSRM_TYPES` may point at the listing
/// tool's type table (one type per line); without it any well-formed
/// `aws_*` identifier is accepted.
fn type_filter() -> Result<TypeFilter> {
    match std::env::var("AWSRM_TYPES") {
        Ok(path) => TypeFilter::from_table_file(path),
        Err(_) => Ok(TypeFilter::WellFormed),
    }
}
