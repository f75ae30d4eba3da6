//! slirc-services - Straylight IRC channel services
//!
//! Usage: `slirc-services [config.toml]`

use std::time::Duration;

use anyhow::Context;
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{error, info};

use slirc_services::clock::{SystemClock, tokio_timers};
use slirc_services::config::{Config, validate};
use slirc_services::services::{LogObserver, MetricsObserver, Services};
use slirc_services::snapshot::SnapshotStore;
use slirc_services::transport::ChannelTransport;
use slirc_services::{driver, http, metrics, telemetry};

/// Longest bridge line accepted from the uplink.
const MAX_BRIDGE_LINE: usize = 8192;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;

    telemetry::init_tracing(config.services.log_format);

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(path = %config_path, error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    // The engine is single-threaded; everything runs on one task.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(
        name = %config.services.name,
        sid = %config.services.sid,
        chanserv = %config.services.chanserv_nick,
        "Starting slirc-services"
    );

    metrics::init();
    if let Some(port) = config.services.metrics_port.filter(|p| *p != 0) {
        tokio::spawn(http::run_http_server(port));
    }

    let address = config.uplink.address();
    let stream = TcpStream::connect(&address)
        .await
        .with_context(|| format!("failed to connect to uplink at {address}"))?;
    info!(%address, "Uplink connected");
    let (read, write) = stream.into_split();
    let lines = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_BRIDGE_LINE));

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut sink = FramedWrite::new(write, LinesCodec::new());
    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = sink.send(line).await {
                error!(error = %e, "Uplink write failed");
                break;
            }
        }
    });

    let store = SnapshotStore::new(&config.database.path);
    let save_every = (config.database.save_interval > 0)
        .then(|| Duration::from_secs(config.database.save_interval));

    let (timers, mut queue) = tokio_timers();
    let mut services = Services::new(
        config,
        Box::new(ChannelTransport::new(tx)),
        Box::new(timers),
        Box::new(SystemClock),
    )?;
    services.add_observer(Box::new(LogObserver));
    services.add_observer(Box::new(MetricsObserver));

    if let Some(snapshot) = store
        .load()
        .with_context(|| format!("failed to load snapshot {}", store.path().display()))?
    {
        services.restore(snapshot)?;
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    let exit = driver::run(&mut services, lines, &mut queue, Some(&store), save_every, shutdown).await;

    // dropping the context closes the writer's queue
    drop(services);
    if let Err(e) = writer.await {
        error!(error = %e, "Uplink writer task failed");
    }
    info!(?exit, "slirc-services stopped");
    Ok(())
}
