//! Run one gateway shard from the command line.
//!
//! Events named with `--event` are logged as they arrive. The shard runs
//! until interrupted with Ctrl-C or until the gateway closes the session
//! with an unrecoverable code.

mod cli;

use std::{error::Error, sync::Arc};

use clap::Parser;
use shardwire::{Dispatcher, Handler, ProxyConfig, Shard};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    // Applications embedding the library install their own subscriber.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = cli::Cli::parse();
    if let Some(addr) = cli.metrics_addr {
        install_exporter(addr)?;
    }

    let dispatcher = Arc::new(Dispatcher::new());
    for event in &cli.events {
        let name = event.clone();
        dispatcher.add_call(
            event.as_str(),
            Handler::new(move |payload| {
                let name = name.clone();
                async move {
                    info!(event = %name, payload = %*payload, "event received");
                    Ok(())
                }
            }),
        );
    }

    let mut builder = Shard::builder(cli.token)
        .intents(cli.intents)
        .shard(cli.shard, cli.shard_count)
        .dispatcher(dispatcher);
    if let Some(gateway) = cli.gateway {
        builder = builder.gateway_base(gateway);
    }
    if let Some(proxy) = cli.proxy {
        builder = builder.proxy(ProxyConfig::new(&proxy)?);
    }
    let shard = builder.build()?;

    shard.connect().await?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupted; closing shard");
            if let Err(e) = shard.close().await {
                warn!(error = %e, "shard was not connected");
            }
            Ok(())
        }
        failure = shard.failure() => Err(failure.into()),
    }
}

#[cfg(feature = "metrics")]
fn install_exporter(addr: std::net::SocketAddr) -> Result<(), Box<dyn Error + Send + Sync>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    info!(%addr, "serving metrics");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_exporter(addr: std::net::SocketAddr) -> Result<(), Box<dyn Error + Send + Sync>> {
    warn!(%addr, "built without the metrics feature; not serving metrics");
    Ok(())
}
