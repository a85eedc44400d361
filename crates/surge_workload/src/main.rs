//! Write-path stress client.
//!
//! Starts `--number-of-threads` workers that each issue one write every
//! `--sleep-time` and log one JSON line per request, e.g.
//!
//! ```text
//! surge-workload run -n $ACCOUNT -k $KEY -e $ENDPOINT -c 600 --number-of-threads 10
//! ```
//!
//! With the default one-second pacing that run takes about ten minutes.
//! Writes go to the in-process simulated store; its behavior is tuned with
//! the `--sim-*` options.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use surge_core::config::RUN_FOREVER;
use surge_core::{
    AccountTopology, BookFactory, ClientOptions, ConsoleSink, Credentials, FanoutSink, FileSink,
    HarnessConfig, RecordSink, RegionResolver, SimulatedConnector, SimulationProfile,
    StoreConnector, WorkerPool,
};
use tracing::{info, warn};

/// CLI entry point wrapper.
#[derive(Parser, Debug)]
#[command(name = "surge-workload")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
}

/// CLI options for a stress run.
#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// Account name; also prefixes the output file names.
    #[arg(short = 'n', long)]
    account_name: String,

    #[arg(short = 'k', long)]
    primary_master_key: String,

    /// Account document endpoint. Endpoints containing `--environment-marker`
    /// are treated as non-production.
    #[arg(short = 'e', long)]
    document_endpoint: String,

    #[arg(short = 'd', long, default_value = "db")]
    database_name: String,

    #[arg(short = 'C', long, default_value = "ct")]
    container_name: String,

    #[arg(long, default_value = "/id")]
    partition_key_path: String,

    /// Minimum writes per worker.
    #[arg(short = 'c', long, default_value_t = 1)]
    count: u64,

    /// Timeout the store client applies to each request.
    #[arg(short = 't', long, default_value = "5s")]
    request_timeout: humantime::Duration,

    /// Wall-clock budget of one attempt before it is cancelled.
    #[arg(long, default_value = "7s")]
    attempt_timeout: humantime::Duration,

    /// Minimum run time: an integer with an optional `s`, `m`, `h` or `d`
    /// suffix (minutes when omitted). When empty the run is unbounded if
    /// `--count` is at most 1, otherwise it stops after `--count` writes.
    #[arg(short = 'r', long, default_value = "")]
    running_time: String,

    #[arg(long, default_value_t = 1)]
    number_of_threads: usize,

    #[arg(short = 'o', long, default_value = "./")]
    output_directory: PathBuf,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    client_telemetry: bool,

    /// Delay between consecutive writes of one worker.
    #[arg(short = 's', long, default_value = "1s")]
    sleep_time: humantime::Duration,

    /// Console lines at or above this many characters are truncated.
    #[arg(short = 'l', long, default_value_t = 120)]
    max_length: usize,

    #[arg(long, default_value_t = false)]
    do_not_truncate: bool,

    #[arg(long, default_value = surge_core::regions::DEFAULT_TEST_MARKER)]
    environment_marker: String,

    /// Comma-separated writable regions of the simulated account.
    #[arg(long, default_value = "West US 2")]
    sim_write_regions: String,

    /// Comma-separated readable regions of the simulated account.
    #[arg(long, default_value = "West US 2,East US 2,North Central US")]
    sim_read_regions: String,

    /// Make the simulated topology query fail (exercises the region fallback).
    #[arg(long, default_value_t = false)]
    sim_topology_fails: bool,

    #[arg(long, default_value = "20ms")]
    sim_latency: humantime::Duration,

    #[arg(long, default_value = "150ms")]
    sim_jitter: humantime::Duration,

    /// Percent of simulated writes failing with a transient store error.
    #[arg(long, default_value_t = 2)]
    sim_error_pct: u8,

    /// Percent of simulated writes failing outside the store's status codes.
    #[arg(long, default_value_t = 0)]
    sim_failure_pct: u8,

    /// Simulation seed (0 picks a random seed).
    #[arg(long, default_value_t = 0)]
    sim_seed: u64,
}

#[tokio::main]
/// Parse CLI args, initialize logging, and run the requested subcommand.
async fn main() -> anyhow::Result<()> {
    // Enable ANSI colors only when stderr is a terminal and NO_COLOR is unset.
    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "surge_core=info,surge_workload=info,warn".into()),
        )
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Run(args) => run(args).await,
    }
}

fn harness_config(args: &RunArgs, running_time: Duration) -> HarnessConfig {
    HarnessConfig {
        worker_count: args.number_of_threads,
        target_attempts: args.count,
        run_duration: running_time,
        pacing_interval: args.sleep_time.into(),
        attempt_timeout: args.attempt_timeout.into(),
        request_timeout: args.request_timeout.into(),
        environment_marker: args.environment_marker.clone(),
        ..HarnessConfig::default()
    }
}

/// Resolve regions, connect, and drive the worker pool to completion.
async fn run(args: RunArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.number_of_threads > 0, "--number-of-threads must be > 0");
    anyhow::ensure!(
        args.sim_error_pct as u16 + args.sim_failure_pct as u16 <= 100,
        "--sim-error-pct plus --sim-failure-pct must be <= 100"
    );
    let running_time = parse_running_time(&args.running_time, args.count)?;
    let config = harness_config(&args, running_time);
    config.validate()?;
    let credentials = Credentials::new(&args.account_name, &args.primary_master_key);
    let connector = simulated_connector(&args)?;

    let preferred_regions = RegionResolver::new(&connector)
        .with_environment_marker(config.environment_marker.clone())
        .resolve(&args.document_endpoint, &credentials)
        .await;

    let options = ClientOptions::default()
        .with_preferred_regions(preferred_regions.clone())
        .with_request_timeout(args.request_timeout.into())
        .with_client_telemetry(args.client_telemetry);
    let client = connector
        .connect(&args.document_endpoint, &credentials, options)
        .await
        .context("connect store client")?;
    client.options().ensure_partition_failover()?;

    let files = OutputFiles::new(&args.output_directory, &args.account_name, Utc::now());
    write_info(&files.info, &args, running_time, &preferred_regions)?;
    let file_sink: Arc<dyn RecordSink> = Arc::new(FileSink::create(&files.log)?);
    let console_sink: Arc<dyn RecordSink> =
        Arc::new(ConsoleSink::new(args.max_length, !args.do_not_truncate));
    let sinks = vec![file_sink, console_sink];
    info!(log = %files.log.display(), info = %files.info.display(), "writing results");

    let pool = WorkerPool::new(
        config,
        Arc::from(client),
        Arc::new(BookFactory),
        Arc::new(FanoutSink::new(sinks)),
    );

    let shutdown = pool.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; waiting for in-flight writes");
            shutdown.cancel();
        }
    });

    let summaries = pool.run().await?;
    for summary in &summaries {
        info!(
            worker_id = summary.worker_id,
            attempts = summary.attempts_issued,
            successes = summary.successes,
            "worker summary"
        );
    }
    Ok(())
}

fn simulated_connector(args: &RunArgs) -> anyhow::Result<SimulatedConnector> {
    let topology = AccountTopology {
        writable_regions: parse_list(&args.sim_write_regions),
        readable_regions: parse_list(&args.sim_read_regions),
    };
    let profile = SimulationProfile {
        latency: args.sim_latency.into(),
        jitter: args.sim_jitter.into(),
        store_error_pct: args.sim_error_pct,
        failure_pct: args.sim_failure_pct,
        seed: args.sim_seed,
    };
    anyhow::ensure!(
        args.partition_key_path.starts_with('/'),
        "--partition-key-path must start with '/'"
    );
    let connector = SimulatedConnector::new(topology)
        .with_profile(profile)
        .with_partition_key_path(args.partition_key_path.clone());
    Ok(if args.sim_topology_fails {
        connector.failing_topology()
    } else {
        connector
    })
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `--running-time`.
fn parse_running_time(input: &str, count: u64) -> anyhow::Result<Duration> {
    let value = input.trim();
    if value.is_empty() {
        return Ok(if count <= 1 { RUN_FOREVER } else { Duration::ZERO });
    }
    let last = value.chars().next_back().unwrap_or('0');
    let (digits, unit_secs) = if last.is_ascii_digit() {
        (value, 60)
    } else {
        let secs = match last {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            other => anyhow::bail!("unknown time unit {other:?} in --running-time {input:?}"),
        };
        (&value[..value.len() - last.len_utf8()], secs)
    };
    let amount: u64 = digits
        .parse()
        .with_context(|| format!("invalid --running-time {input:?}"))?;
    let secs = amount
        .checked_mul(unit_secs)
        .with_context(|| format!("--running-time {input:?} is too large"))?;
    Ok(Duration::from_secs(secs))
}

/// Per-run output file locations.
struct OutputFiles {
    log: PathBuf,
    info: PathBuf,
}

impl OutputFiles {
    fn new(dir: &Path, account: &str, now: DateTime<Utc>) -> Self {
        let base = format!("{account}-{}", now.format("%y%m%d-%H%M"));
        Self {
            log: dir.join(format!("{base}.log")),
            info: dir.join(format!("{base}-info1.txt")),
        }
    }
}

/// Run summary written next to the result log. The key is never written.
fn info_text(args: &RunArgs, running_time: Duration, regions: &[String]) -> String {
    let running_time = if running_time == RUN_FOREVER {
        "until interrupted".to_string()
    } else {
        humantime::format_duration(running_time).to_string()
    };
    [
        format!(
            "Targeting writes from {} workers, at least {} writes each",
            args.number_of_threads, args.count
        ),
        format!("Document endpoint={}", args.document_endpoint),
        "Key=<redacted>".to_string(),
        format!("Database={}", args.database_name),
        format!("Container={}", args.container_name),
        format!("Partition key path={}", args.partition_key_path),
        format!("Running time={running_time}"),
        format!("Preferred regions={}", regions.join(",")),
    ]
    .join("\n")
}

fn write_info(
    path: &Path,
    args: &RunArgs,
    running_time: Duration,
    regions: &[String],
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    std::fs::write(path, info_text(args, running_time, regions))
        .with_context(|| format!("write {}", path.display()))
}
