//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the gateway daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
mod runtime;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use r_ems_asset::AssetConfiguration;
use r_ems_common::config::{GatewayConfig, LoadedGatewayConfig};
use r_ems_common::logging::init_tracing;
use r_ems_metrics::{new_registry, spawn_http_server, DaemonMetrics, WireAssetMetrics};
use tokio::signal;
use tracing::info;

use crate::runtime::{build_assets, Gateway};

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("R-EMS gateway ", env!("CARGO_PKG_VERSION")),
    about = "R-EMS field gateway daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run every enabled asset until interrupted")]
    Run,
    #[command(about = "Validate the configuration and print the parsed assets")]
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/gateway.toml"));
    candidates.push(PathBuf::from("configs/gateway.example.toml"));

    let load_started = Instant::now();
    let loaded = GatewayConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_gateway(loaded, load_duration).await,
        Commands::Check => {
            render_check(&loaded)?;
            Ok(())
        }
    }
}

async fn run_gateway(loaded: LoadedGatewayConfig, load_duration: std::time::Duration) -> Result<()> {
    let LoadedGatewayConfig { config, source } = loaded;
    init_tracing("r-ems-gatewayd", &config.logging)?;
    info!(config_path = %source.display(), gateway = %config.gateway.name, "configuration loaded");

    let registry = new_registry();
    let daemon_metrics = DaemonMetrics::new(registry.clone())?;
    daemon_metrics.inc_start();
    daemon_metrics.observe_config_load(load_duration);
    let asset_metrics = WireAssetMetrics::new(&registry)?;

    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_http_server(registry.clone(), config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let assets = build_assets(&config, Some(&asset_metrics))?;
    let gateway = Gateway::start(assets).await?;
    daemon_metrics.set_assets_active(gateway.asset_count());

    info!(assets = gateway.asset_count(), "gateway running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    gateway.shutdown().await?;
    daemon_metrics.set_assets_active(0);

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }
    Ok(())
}

fn render_check(loaded: &LoadedGatewayConfig) -> Result<()> {
    let config = &loaded.config;
    build_assets(config, None)?;
    println!(
        "Configuration: {}\nGateway: {}",
        loaded.source.display(),
        config.gateway.name
    );
    for (name, asset) in &config.assets {
        let parsed = AssetConfiguration::from_properties(1, &asset.property_bag());
        let readable = parsed.readable_channels().len();
        println!(
            "Asset {name}: driver={} enabled={} poll={}ms channels={} readable={} on_change={} timestamps={}",
            asset.driver,
            asset.enabled,
            asset.poll_interval.as_millis(),
            parsed.channels.len(),
            readable,
            parsed.options.emit_on_change,
            parsed.options.timestamp_mode,
        );
    }
    Ok(())
}
