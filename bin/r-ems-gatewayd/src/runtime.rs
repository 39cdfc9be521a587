//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Asset construction and poll loops for the gateway daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use r_ems_asset::{Driver, EmitOutcome, SimulatedDriver, WireAsset, SIM_DRIVER_KIND};
use r_ems_common::config::{AssetConfig, GatewayConfig};
use r_ems_common::now_millis;
use r_ems_common::time::millis_to_rfc3339;
use r_ems_metrics::WireAssetMetrics;
use r_ems_wire::WireEnvelope;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One configured asset ready to be activated.
#[derive(Debug, Clone)]
pub struct GatewayAsset {
    pub asset: WireAsset,
    pub poll_interval: Duration,
}

/// Build every enabled asset of `config`.
pub fn build_assets(
    config: &GatewayConfig,
    metrics: Option<&WireAssetMetrics>,
) -> Result<Vec<GatewayAsset>> {
    config
        .enabled_assets()
        .map(|(name, asset)| build_asset(name, asset, config.gateway.channel_capacity, metrics))
        .collect()
}

fn build_asset(
    name: &str,
    config: &AssetConfig,
    capacity: usize,
    metrics: Option<&WireAssetMetrics>,
) -> Result<GatewayAsset> {
    let driver: Arc<dyn Driver> = match config.driver.as_str() {
        SIM_DRIVER_KIND => Arc::new(SimulatedDriver::new()),
        other => bail!("asset '{name}' uses unsupported driver '{other}'"),
    };
    let mut builder = WireAsset::builder(name, driver)
        .properties(config.property_bag())
        .channel_capacity(capacity);
    if let Some(metrics) = metrics {
        builder = builder.metrics(metrics.clone());
    }
    Ok(GatewayAsset {
        asset: builder.build(),
        poll_interval: config.poll_interval,
    })
}

/// Running assets plus the tasks driving them.
pub struct Gateway {
    assets: Vec<GatewayAsset>,
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Activate every asset and spawn its poll loop and envelope logger.
    pub async fn start(assets: Vec<GatewayAsset>) -> Result<Self> {
        let (shutdown, _) = broadcast::channel(1);
        let mut tasks = Vec::with_capacity(assets.len() * 2);
        for entry in &assets {
            let envelopes = entry.asset.subscribe();
            entry
                .asset
                .activate()
                .await
                .with_context(|| format!("failed to activate asset {}", entry.asset.name()))?;
            tasks.push(tokio::spawn(log_envelopes(envelopes, shutdown.subscribe())));
            tasks.push(tokio::spawn(poll_loop(
                entry.asset.clone(),
                entry.poll_interval,
                shutdown.subscribe(),
            )));
        }
        Ok(Self {
            assets,
            shutdown,
            tasks,
        })
    }

    /// Number of running assets.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Stop the loops and deactivate every asset.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        for task in self.tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "gateway task ended abnormally");
            }
        }
        for entry in &self.assets {
            entry.asset.deactivate().await?;
        }
        info!(assets = self.assets.len(), "gateway stopped");
        Ok(())
    }
}

async fn poll_loop(asset: WireAsset, every: Duration, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => match asset.emit_all_read_channels().await {
                Ok(EmitOutcome::Emitted { properties, receivers }) => {
                    debug!(asset = %asset.name(), properties, receivers, "poll emitted");
                }
                Ok(outcome) => debug!(asset = %asset.name(), ?outcome, "poll emitted nothing"),
                Err(err) => warn!(asset = %asset.name(), error = %err, "poll failed"),
            },
        }
    }
}

async fn log_envelopes(
    mut envelopes: broadcast::Receiver<WireEnvelope>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            received = envelopes.recv() => match received {
                Ok(envelope) => log_envelope(&envelope),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "envelope logger lagging behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

fn log_envelope(envelope: &WireEnvelope) {
    let received_at = millis_to_rfc3339(now_millis()).unwrap_or_default();
    match envelope.to_json() {
        Ok(json) => info!(
            emitter = %envelope.emitter_pid,
            received_at = %received_at,
            envelope = %json,
            "wire envelope"
        ),
        Err(err) => warn!(emitter = %envelope.emitter_pid, error = %err, "failed to encode envelope"),
    }
}
