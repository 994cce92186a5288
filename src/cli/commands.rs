//! CLI command definitions for crawl-dispatch.
//!
//! Every command reads its connection settings from the environment (see
//! [`DispatcherConfig::from_env`]); flags only override pass parameters.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::DispatcherConfig;
use crate::dispatch::{
    Deadline, DispatchPass, GateDecision, InvocationResponse, PassReport, PublishPolicy,
    QueueDepthGate,
};
use crate::error::{DispatchError, PassStage};
use crate::metrics::{init_metrics, write_textfile};
use crate::queue::{RedisWorkQueue, WorkQueue};
use crate::storage::{PgWorkItemStore, WorkItemStore};

/// Queue-depth-gated dispatcher for stale crawler pages.
#[derive(Parser)]
#[command(name = "crawl-dispatch")]
#[command(about = "Refill the crawler work queue with stale pages when it runs low")]
#[command(version)]
#[command(
    long_about = "crawl-dispatch checks the depth of the crawler work queue and, when it is at or below the threshold, publishes a batch of stale active pages to it.\n\nConnection settings come from PG_* and QUEUE_* environment variables.\n\nExample usage:\n  crawl-dispatch run --threshold 100 --fetch-amount 50"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run one dispatch pass.
    Run(RunArgs),

    /// Evaluate the queue depth gate without selecting or publishing.
    Check(CheckArgs),

    /// Create the pages table and its indexes.
    Migrate,
}

/// Arguments for `crawl-dispatch run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Maximum queue depth at which dispatch is still allowed (overrides QUEUE_THRESHOLD).
    #[arg(short, long)]
    pub threshold: Option<u64>,

    /// Maximum number of pages to publish in this pass (overrides FETCH_AMOUNT).
    #[arg(short = 'n', long)]
    pub fetch_amount: Option<usize>,

    /// Publish failure handling: fail_fast or resilient (overrides PUBLISH_POLICY).
    #[arg(long)]
    pub publish_policy: Option<PublishPolicy>,

    /// Output the invocation response as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Write Prometheus metrics to this file after the pass.
    #[arg(long, env = "METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,
}

/// Arguments for `crawl-dispatch check`.
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Threshold to check against (overrides QUEUE_THRESHOLD).
    #[arg(short, long)]
    pub threshold: Option<u64>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_dispatch_command(args).await?,
        Commands::Check(args) => run_check_command(args).await?,
        Commands::Migrate => run_migrate_command().await?,
    }
    Ok(())
}

/// Loads config through `lookup` and applies `run` flag overrides.
fn load_run_config<L>(args: &RunArgs, lookup: L) -> Result<DispatcherConfig, DispatchError>
where
    L: Fn(&str) -> Option<String>,
{
    let mut config = DispatcherConfig::from_lookup(lookup)?;
    if let Some(threshold) = args.threshold {
        config = config.with_threshold(threshold);
    }
    if let Some(amount) = args.fetch_amount {
        config = config.with_fetch_amount(amount);
    }
    if let Some(policy) = args.publish_policy {
        config = config.with_publish_policy(policy);
    }
    config.validate()?;
    Ok(config)
}

type Clients = (Arc<dyn WorkQueue>, Arc<dyn WorkItemStore>);

async fn connect_clients(config: DispatcherConfig) -> Result<Clients, DispatchError> {
    let queue = RedisWorkQueue::connect(&config.queue.redis_url, &config.queue.queue_name).await?;
    let store = PgWorkItemStore::connect(&config.store).await?;
    Ok((Arc::new(queue), Arc::new(store)))
}

/// Validates configuration, then connects and runs one pass.
///
/// Nothing is connected until the configuration is valid, and the pass
/// deadline starts before connecting so slow endpoints count against it.
async fn dispatch_once<L, C, Fut>(
    args: &RunArgs,
    lookup: L,
    connect: C,
) -> Result<PassReport, DispatchError>
where
    L: Fn(&str) -> Option<String>,
    C: FnOnce(DispatcherConfig) -> Fut,
    Fut: Future<Output = Result<Clients, DispatchError>>,
{
    let config = load_run_config(args, lookup)?;
    info!(
        queue = %config.queue.queue_name,
        threshold = config.threshold,
        fetch_amount = config.fetch_amount,
        order = %config.selection_order,
        policy = %config.publish_policy,
        "Starting dispatch pass"
    );

    let deadline = Deadline::after(config.pass_timeout);
    let (queue, store) = deadline
        .run(PassStage::Connect, connect(config.clone()))
        .await?;

    let pass = DispatchPass::new(queue, Arc::clone(&store), &config);
    let result = pass.run_within(deadline).await;
    store.close().await;
    result
}

fn print_response(response: &InvocationResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        println!("[{}] {}", response.status, response.message);
    }
    Ok(())
}

async fn run_dispatch_command(args: RunArgs) -> anyhow::Result<()> {
    if args.metrics_file.is_some() {
        init_metrics()?;
    }

    let result = dispatch_once(&args, |key| std::env::var(key).ok(), connect_clients).await;

    let response = match &result {
        Ok(report) => report.response(),
        Err(err) => InvocationResponse::from_error(err),
    };
    print_response(&response, args.json)?;

    if let Some(path) = &args.metrics_file {
        if let Err(e) = write_textfile(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics file");
        }
    }

    result?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    queue: String,
    depth: u64,
    threshold: u64,
    authorized: bool,
}

impl CheckOutput {
    fn new(queue: &str, decision: &GateDecision) -> Self {
        Self {
            queue: queue.to_string(),
            depth: decision.snapshot.depth,
            threshold: decision.threshold,
            authorized: decision.authorized,
        }
    }
}

async fn run_check_command(args: CheckArgs) -> anyhow::Result<()> {
    let mut config = DispatcherConfig::from_env()?;
    if let Some(threshold) = args.threshold {
        config = config.with_threshold(threshold);
    }

    let queue = RedisWorkQueue::connect(&config.queue.redis_url, &config.queue.queue_name).await?;
    let gate = QueueDepthGate::new(Arc::new(queue), config.threshold);
    let decision = gate.evaluate().await?;
    let output = CheckOutput::new(&config.queue.queue_name, &decision);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let verdict = if output.authorized { "dispatch allowed" } else { "dispatch blocked" };
        println!(
            "Queue '{}': depth {} / threshold {} ({})",
            output.queue, output.depth, output.threshold, verdict
        );
    }
    Ok(())
}

async fn run_migrate_command() -> anyhow::Result<()> {
    let config = DispatcherConfig::from_env()?;
    let store = PgWorkItemStore::connect(&config.store).await?;
    let applied = store.run_migrations().await;
    store.close().await;

    let applied = applied?;
    println!("Applied {applied} schema statements");
    Ok(())
}
