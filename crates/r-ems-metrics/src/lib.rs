//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Path the exporter serves.
pub const METRICS_PATH: &str = "/metrics";

/// Shared registry type used across services.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {addr}"))?;
    std_listener
        .set_nonblocking(true)
        .context("failed to configure metrics listener as non-blocking")?;
    TcpListener::from_std(std_listener).context("failed to convert std listener into tokio listener")
}

/// Spawn an HTTP server that exposes the registry at [`METRICS_PATH`].
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        METRICS_PATH,
        get(move || metrics_handler(registry.clone())),
    );
    let listener = bind_listener(addr)?;
    let addr = listener.local_addr().unwrap_or(addr);
    info!(address = %addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}

/// Render the registry in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metrics")
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    match render(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Bound address; reflects the real port when binding to port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task
            .await
            .map_err(anyhow::Error::new)
            .and_then(|result| result)
    }
}

/// Metrics recorded by the gateway daemon process itself.
#[derive(Clone, Debug)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    assets_active: IntGauge,
}

impl DaemonMetrics {
    /// Register the daemon metrics on `registry`.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "r_ems_gatewayd_starts_total",
            "Total number of times the gateway daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "r_ems_gatewayd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let assets_active = IntGauge::with_opts(Opts::new(
            "r_ems_gatewayd_assets_active",
            "Number of assets currently activated",
        ))?;
        registry.register(Box::new(assets_active.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            assets_active,
        })
    }

    /// Registry the metrics live in.
    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Count one daemon start.
    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    /// Record how long configuration loading took.
    pub fn observe_config_load(&self, elapsed: Duration) {
        self.config_load_seconds.observe(elapsed.as_secs_f64());
    }

    /// Publish the number of active assets.
    pub fn set_assets_active(&self, count: usize) {
        self.assets_active.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

/// Per-asset metrics of the wire emission pipeline, labelled by asset name.
#[derive(Clone, Debug)]
pub struct WireAssetMetrics {
    envelopes_emitted: IntCounterVec,
    records_suppressed: IntCounterVec,
    channel_failures: IntCounterVec,
    write_records: IntCounterVec,
    empty_discarded: IntCounterVec,
    poll_seconds: HistogramVec,
}

impl WireAssetMetrics {
    /// Register the asset metrics on `registry`.
    pub fn new(registry: &Registry) -> Result<Self> {
        let counter = |name: &str, help: &str, labels: &[&str]| -> Result<IntCounterVec> {
            let vec = IntCounterVec::new(Opts::new(name, help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        let envelopes_emitted = counter(
            "r_ems_asset_envelopes_emitted_total",
            "Wire envelopes published downstream",
            &["asset"],
        )?;
        let records_suppressed = counter(
            "r_ems_asset_records_suppressed_total",
            "Channel records dropped by the value change filter",
            &["asset"],
        )?;
        let channel_failures = counter(
            "r_ems_asset_channel_failures_total",
            "Channel reads or writes that completed with a failure status",
            &["asset", "channel"],
        )?;
        let write_records = counter(
            "r_ems_asset_write_records_total",
            "Write requests dispatched to the driver",
            &["asset"],
        )?;
        let empty_discarded = counter(
            "r_ems_asset_empty_records_discarded_total",
            "Empty wire records rejected at the emit boundary",
            &["asset"],
        )?;

        let buckets = prometheus::exponential_buckets(0.0005, 2.0, 14)
            .context("failed to construct histogram buckets")?;
        let poll_seconds = HistogramVec::new(
            HistogramOpts::new(
                "r_ems_asset_poll_seconds",
                "Latency of a full read and emit cycle",
            )
            .buckets(buckets),
            &["asset"],
        )?;
        registry.register(Box::new(poll_seconds.clone()))?;

        Ok(Self {
            envelopes_emitted,
            records_suppressed,
            channel_failures,
            write_records,
            empty_discarded,
            poll_seconds,
        })
    }

    /// Count one published envelope.
    pub fn record_emitted(&self, asset: &str) {
        self.envelopes_emitted.with_label_values(&[asset]).inc();
    }

    /// Count records dropped by the change filter.
    pub fn record_suppressed(&self, asset: &str, count: usize) {
        if count > 0 {
            self.records_suppressed
                .with_label_values(&[asset])
                .inc_by(count as u64);
        }
    }

    /// Count one failed channel operation.
    pub fn record_channel_failure(&self, asset: &str, channel: &str) {
        self.channel_failures
            .with_label_values(&[asset, channel])
            .inc();
    }

    /// Count write requests handed to the driver.
    pub fn record_writes(&self, asset: &str, count: usize) {
        self.write_records
            .with_label_values(&[asset])
            .inc_by(count as u64);
    }

    /// Count one empty record discarded at the emit boundary.
    pub fn record_empty_discarded(&self, asset: &str) {
        self.empty_discarded.with_label_values(&[asset]).inc();
    }

    /// Record the latency of one poll cycle.
    pub fn observe_poll(&self, asset: &str, elapsed: Duration) {
        self.poll_seconds
            .with_label_values(&[asset])
            .observe(elapsed.as_secs_f64());
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_metrics_render_with_labels() {
        let registry = new_registry();
        let metrics = WireAssetMetrics::new(&registry).expect("register asset metrics");
        metrics.record_emitted("boiler");
        metrics.record_suppressed("boiler", 3);
        metrics.record_suppressed("boiler", 0);
        metrics.record_channel_failure("boiler", "temp");
        metrics.observe_poll("boiler", Duration::from_millis(4));

        let body = render(&registry).expect("render");
        assert!(body.contains(r#"r_ems_asset_envelopes_emitted_total{asset="boiler"} 1"#));
        assert!(body.contains(r#"r_ems_asset_records_suppressed_total{asset="boiler"} 3"#));
        assert!(body.contains(r#"r_ems_asset_channel_failures_total{asset="boiler",channel="temp"} 1"#));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = new_registry();
        DaemonMetrics::new(registry.clone()).expect("first registration");
        assert!(DaemonMetrics::new(registry).is_err());
    }

    #[tokio::test]
    async fn exporter_serves_and_shuts_down() {
        let registry = new_registry();
        let daemon = DaemonMetrics::new(registry.clone()).expect("daemon metrics");
        daemon.inc_start();
        let server = spawn_http_server(registry, "127.0.0.1:0".parse().expect("addr"))
            .expect("spawn exporter");
        assert_ne!(server.addr().port(), 0);
        server.shutdown().await.expect("shutdown");
    }
}
