use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Args;
use pingviz::config::Config;
use pingviz::dispatch::{Dispatcher, ShutdownCoordinator};
use pingviz::metrics::{MetricsSink, StatsdClient};
use pingviz::probe::open_icmp_socket;
use pingviz::transport::spawn_transport;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG > --log > config file
    let level = args
        .log_level()
        .map(str::to_string)
        .unwrap_or_else(|| config.log.clone());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .init();

    tracing::info!(loglevel = %level, "Starting up PingViz");

    // Without the socket no host can be probed
    let socket = match open_icmp_socket() {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let (engine, transport_handle) = spawn_transport(socket, cancel.clone());

    let mut coordinator = ShutdownCoordinator::new(cancel);
    for host in config.monitored_hosts() {
        // A metrics failure only takes this host out
        let client = match StatsdClient::connect(&config.report.host) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(host = %host.name, error = %e, "Unable to connect to statsd host");
                continue;
            }
        };
        tracing::debug!(host = %host.name, statsd_server = %client.addr(), "Connected to statsd");

        let metrics: Arc<dyn MetricsSink> = Arc::new(client);
        let name = host.name.clone();
        let dispatcher = Dispatcher::new(host, engine.clone(), metrics, coordinator.token());
        coordinator.spawn(name, dispatcher);
    }

    // Dispatchers hold the remaining handles; the transport exits after they stop
    drop(engine);

    if coordinator.is_empty() {
        anyhow::bail!("No hosts to monitor");
    }
    tracing::info!(hosts = coordinator.len(), "Monitoring");

    coordinator.listen_for_interrupt();
    let stats = coordinator.wait().await;
    for s in &stats {
        tracing::debug!(
            host = %s.host,
            probes = s.probes,
            successes = s.successes,
            failures = s.failures,
            "Dispatcher stopped"
        );
    }

    let transport_result = tokio::task::spawn_blocking(move || transport_handle.join())
        .await
        .context("Failed to join transport thread")?;
    transport_result.map_err(|e| {
        // This branch shouldn't be reached since we use catch_unwind in the worker
        let msg = e
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| e.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        anyhow::anyhow!("Transport thread failed: {}", msg)
    })??;

    tracing::info!("Closing PingViz");
    Ok(())
}
