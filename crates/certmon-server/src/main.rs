use anyhow::Result;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use certmon_server::config::ServerConfig;
use certmon_server::scheduler::RunOutcome;
use certmon_server::worker::Worker;

const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  certmon-server [config.toml]                                  Start the worker loops");
    eprintln!("  certmon-server run-once <checks|heartbeat|outbox> [config.toml]  Run one cycle and exit");
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default CryptoProvider: {e:?}"))?;

    certmon_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("certmon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("run-once") => {
            let task = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("run-once requires a loop name")
            })?;
            let config_path = args.get(3).map(|s| s.as_str()).unwrap_or(DEFAULT_CONFIG_PATH);
            run_once(task, config_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args.get(1).map(|s| s.as_str()).unwrap_or(DEFAULT_CONFIG_PATH);
            run_worker(config_path).await
        }
    }
}

async fn run_worker(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    tracing::info!(
        config = config_path,
        environment = %config.environment,
        checks_interval_secs = config.checks.interval_secs,
        heartbeat_interval_secs = config.heartbeat.interval_secs,
        outbox_poll_secs = config.outbox.poll_interval_secs,
        "Starting certmon worker"
    );

    let worker = Worker::from_config(config).await?;
    let handles = worker.spawn();

    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping loops");
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

async fn run_once(task: &str, config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let worker = Worker::from_config(config).await?;
    let scheduler = worker
        .schedulers()
        .into_iter()
        .find(|s| s.name() == task)
        .ok_or_else(|| {
            print_usage();
            anyhow::anyhow!("Unknown or disabled loop '{task}'")
        })?;

    match scheduler.run_once().await {
        RunOutcome::Failed => anyhow::bail!("{task} run failed"),
        RunOutcome::Finished | RunOutcome::Skipped => Ok(()),
    }
}
