mod address;
mod api;
mod status;
mod store;

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use tokio::{sync::broadcast, time::sleep};
use tower::make::Shared;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    address::{AddressTable, LoadPolicy},
    api::AppState,
    status::StatusRelay,
    store::TelemetryStore,
};

#[derive(Parser)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// File with one `address,id` device entry per line
    #[arg(long, default_value = "ip.cfg")]
    ip_config: PathBuf,

    /// Refuse to start when the device file has a malformed line
    #[arg(long)]
    strict_config: bool,

    /// Port devices answer status queries on
    #[arg(long, default_value_t = status::DEFAULT_DEVICE_PORT)]
    device_port: u16,

    /// Device queried by `GET /status`
    #[arg(long, default_value_t = 4)]
    status_device: u32,

    /// Seconds to wait for a device to answer a status query
    #[arg(
        long,
        default_value_t = status::DEFAULT_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..),
    )]
    status_timeout: u64,

    /// Name of the server certificate to load for TLS
    #[arg(short, long)]
    domain: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("telemetry_server=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();

    let policy = if args.strict_config {
        LoadPolicy::FailFast
    } else {
        LoadPolicy::Skip
    };
    let addresses = AddressTable::load_or_empty(&args.ip_config, policy)
        .with_context(|| format!("loading {}", args.ip_config.display()))?;
    if addresses.is_empty() {
        warn!("no device addresses, status relay will answer 404");
    }
    for (id, address) in addresses.iter() {
        info!("device {id} -> {address}");
    }
    if !addresses.is_empty() && addresses.resolve(args.status_device).is_none() {
        warn!("default status device {} has no address", args.status_device);
    }

    let relay = StatusRelay::new(
        Arc::new(addresses),
        args.device_port,
        Duration::from_secs(args.status_timeout),
    )
    .context("building status client")?;

    let state = AppState {
        store: Arc::new(TelemetryStore::new()),
        relay: Arc::new(relay),
        live: broadcast::channel(16).0,
        status_device: args.status_device,
    };
    let router = api::router(state);

    let addr = SocketAddr::new(args.bind, args.port);
    info!("listening on {addr}");

    if let Some(domain) = args.domain {
        let config = RustlsConfig::from_pem_file(
            format!("/etc/letsencrypt/live/{domain}/fullchain.pem"),
            format!("/etc/letsencrypt/live/{domain}/privkey.pem"),
        )
        .await
        .with_context(|| format!("loading certificate for {domain}"))?;

        tokio::spawn(reload(config.clone(), domain));
        axum_server::bind_rustls(addr, config)
            .serve(Shared::new(router))
            .await?;
    } else {
        axum_server::bind(addr).serve(Shared::new(router)).await?;
    }

    Ok(())
}

async fn reload(config: RustlsConfig, domain: String) {
    loop {
        sleep(Duration::from_secs(100_000)).await;
        info!("reloading rustls configuration");

        if let Err(err) = config
            .reload_from_pem_file(
                format!("/etc/letsencrypt/live/{domain}/fullchain.pem"),
                format!("/etc/letsencrypt/live/{domain}/privkey.pem"),
            )
            .await
        {
            warn!("keeping old certificate for {domain}: {err}");
        }
    }
}
