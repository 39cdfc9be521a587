//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Asset orchestrating driver reads, emission and inbound writes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Wire asset orchestration.
//!
//! A [`WireAsset`] owns one configuration generation at a time. Polls and
//! driver events read channels through the [`Driver`], optionally pass the
//! records through the [`ChangeFilter`], flatten them and publish the result
//! through its [`WireSupport`]. Inbound envelopes are matched against the
//! writable channels and written back through the driver.
//!
//! The prepared read and its [`PreparedEmit`] plan live behind one async
//! mutex. Configuration swaps happen while holding that mutex, so a plan
//! built under old options is never used after the swap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;
use r_ems_channel::{AssetDescriptor, Channel, ChannelRecord, Properties, RecordBatch};
use r_ems_logging::{ems_debug, ems_error, ems_warn, log_system_event, LogContext, SystemEventOutcome};
use r_ems_metrics::WireAssetMetrics;
use r_ems_wire::{
    error_text, flatten, match_writes, ChangeFilter, EmitOptions, PreparedEmit, WireEnvelope,
    WireError, WireRecord, WireSupport, DEFAULT_CHANNEL_CAPACITY,
};
use tokio::sync::{broadcast, Mutex};

use crate::driver::{ChannelEvent, ChannelListener, Driver, ListenerHandle, PreparedRead};
use crate::error::{AssetError, Result};

/// Parsed configuration of one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetConfiguration {
    /// Increases by one on every update, starting at 1.
    pub generation: u64,
    /// Driver instance named in the property bag.
    pub driver_pid: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Emission policy.
    pub options: EmitOptions,
    /// Valid channels keyed by name.
    pub channels: IndexMap<String, Channel>,
}

impl AssetConfiguration {
    /// Parse a property bag into the given generation.
    pub fn from_properties(generation: u64, properties: &Properties) -> Self {
        let AssetDescriptor {
            driver_pid,
            description,
            channels,
        } = AssetDescriptor::from_properties(properties);
        Self {
            generation,
            driver_pid,
            description,
            options: EmitOptions::from_properties(properties),
            channels,
        }
    }

    /// Enabled channels that can be read, in declaration order.
    pub fn readable_channels(&self) -> Vec<Channel> {
        self.channels
            .values()
            .filter(|channel| channel.is_readable())
            .cloned()
            .collect()
    }

    /// Whether at least one enabled channel can be read.
    pub fn has_readable_channels(&self) -> bool {
        self.channels.values().any(Channel::is_readable)
    }

    /// Enabled channels asking for driver events.
    pub fn listened_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels
            .values()
            .filter(|channel| channel.enabled && channel.listen)
    }

    fn all_channels(&self) -> Vec<Channel> {
        self.channels.values().cloned().collect()
    }
}

/// What happened to one emission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// A record was published.
    Emitted {
        /// Number of properties in the record.
        properties: usize,
        /// Receivers that got the envelope.
        receivers: usize,
    },
    /// The record was empty and empty envelopes are disabled.
    Discarded,
    /// The asset has no enabled readable channel.
    NoReadableChannels,
    /// The event did not belong to an enabled channel of the asset.
    Ignored,
}

struct PreparedState {
    read: Box<dyn PreparedRead>,
    emit: PreparedEmit,
}

struct AssetInner {
    name: String,
    driver: Arc<dyn Driver>,
    support: WireSupport,
    config: RwLock<Arc<AssetConfiguration>>,
    change_filter: ChangeFilter,
    prepared: Mutex<Option<PreparedState>>,
    listeners: Mutex<Vec<ListenerHandle>>,
    active: AtomicBool,
    metrics: Option<WireAssetMetrics>,
}

/// Builder for [`WireAsset`].
pub struct WireAssetBuilder {
    name: String,
    driver: Arc<dyn Driver>,
    properties: Properties,
    channel_capacity: usize,
    metrics: Option<WireAssetMetrics>,
}

impl WireAssetBuilder {
    /// Initial property bag.
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Capacity of the downstream broadcast channel.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Record pipeline metrics.
    pub fn metrics(mut self, metrics: WireAssetMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the asset in the inactive state.
    pub fn build(self) -> WireAsset {
        let config = AssetConfiguration::from_properties(1, &self.properties);
        WireAsset {
            inner: Arc::new(AssetInner {
                support: WireSupport::new(self.name.clone(), self.channel_capacity),
                name: self.name,
                driver: self.driver,
                config: RwLock::new(Arc::new(config)),
                change_filter: ChangeFilter::new(),
                prepared: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                active: AtomicBool::new(false),
                metrics: self.metrics,
            }),
        }
    }
}

/// Asset bridging one driver to the wire record stream.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WireAsset {
    inner: Arc<AssetInner>,
}

impl std::fmt::Debug for WireAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireAsset")
            .field("name", &self.inner.name)
            .field("driver", &self.inner.driver.kind())
            .field("generation", &self.configuration().generation)
            .field("active", &self.is_active())
            .finish()
    }
}

impl WireAsset {
    /// Start building an asset named `name` on top of `driver`.
    pub fn builder(name: impl Into<String>, driver: Arc<dyn Driver>) -> WireAssetBuilder {
        WireAssetBuilder {
            name: name.into(),
            driver,
            properties: Properties::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            metrics: None,
        }
    }

    /// Build an inactive asset with default settings.
    pub fn new(name: impl Into<String>, driver: Arc<dyn Driver>, properties: &Properties) -> Self {
        Self::builder(name, driver)
            .properties(properties.clone())
            .build()
    }

    /// Asset name, also used as the envelope emitter id.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current configuration generation.
    pub fn configuration(&self) -> Arc<AssetConfiguration> {
        self.inner.config.read().clone()
    }

    /// Whether the asset has been activated and not deactivated since.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Attach a downstream receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<WireEnvelope> {
        self.inner.support.subscribe()
    }

    /// Connect the driver, hand it the channels and register listeners.
    pub async fn activate(&self) -> Result<()> {
        if self.inner.active.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let config = self.configuration();
        let ctx = self.log_context(config.generation);
        if let Err(err) = self.start_driver(&config).await {
            self.inner.active.store(false, Ordering::SeqCst);
            log_system_event(
                Some(&ctx),
                "asset.activated",
                &err.to_string(),
                SystemEventOutcome::Fault,
            );
            return Err(err);
        }
        self.register_listeners(&config).await;
        log_system_event(
            Some(&ctx),
            "asset.activated",
            &format!("{} channels configured", config.channels.len()),
            SystemEventOutcome::Success,
        );
        Ok(())
    }

    async fn start_driver(&self, config: &AssetConfiguration) -> Result<()> {
        self.inner
            .driver
            .connect()
            .await
            .map_err(|err| AssetError::driver("connect", err))?;
        self.inner
            .driver
            .configure(&config.all_channels())
            .await
            .map_err(|err| AssetError::driver("configure", err))
    }

    /// Install a new configuration generation parsed from `properties`.
    ///
    /// The prepared read and the change filter are dropped together with the
    /// swap. Listeners are re-registered when the asset is active.
    pub async fn update(&self, properties: &Properties) -> Result<Arc<AssetConfiguration>> {
        let next = {
            let mut prepared = self.inner.prepared.lock().await;
            let generation = self.configuration().generation + 1;
            let next = Arc::new(AssetConfiguration::from_properties(generation, properties));
            *self.inner.config.write() = Arc::clone(&next);
            prepared.take();
            self.inner.change_filter.clear();
            next
        };

        let ctx = self.log_context(next.generation);
        if self.is_active() {
            self.inner
                .driver
                .configure(&next.all_channels())
                .await
                .map_err(|err| AssetError::driver("configure", err))?;
            self.register_listeners(&next).await;
        }
        log_system_event(
            Some(&ctx),
            "asset.updated",
            &format!("{} channels configured", next.channels.len()),
            SystemEventOutcome::Success,
        );
        Ok(next)
    }

    /// Unregister listeners, drop the prepared read and disconnect the driver.
    pub async fn deactivate(&self) -> Result<()> {
        if !self.inner.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.unregister_listeners().await;
        self.inner.prepared.lock().await.take();
        let ctx = self.log_context(self.configuration().generation);
        self.inner
            .driver
            .disconnect()
            .await
            .map_err(|err| AssetError::driver("disconnect", err))?;
        log_system_event(
            Some(&ctx),
            "asset.deactivated",
            "driver disconnected",
            SystemEventOutcome::Success,
        );
        Ok(())
    }

    /// Drop the prepared read; the next poll prepares a fresh one.
    ///
    /// Drivers can request the same through [`PreparedRead::is_valid`].
    pub async fn invalidate_prepared_read(&self) {
        if self.inner.prepared.lock().await.take().is_some() {
            let ctx = self.log_context(self.configuration().generation);
            ems_debug!(context = ctx, "prepared read invalidated");
        }
    }

    /// Read every enabled readable channel and emit the result.
    pub async fn emit_all_read_channels(&self) -> Result<EmitOutcome> {
        self.ensure_active()?;
        let started = Instant::now();
        let mut prepared = self.inner.prepared.lock().await;
        let config = self.configuration();
        if !config.has_readable_channels() {
            return Ok(EmitOutcome::NoReadableChannels);
        }

        if prepared.as_ref().is_some_and(|state| !state.read.is_valid()) {
            prepared.take();
            let ctx = self.log_context(config.generation);
            ems_debug!(context = ctx, "driver invalidated the prepared read");
        }
        if prepared.is_none() {
            *prepared = self
                .inner
                .driver
                .prepare_read(&config.readable_channels())
                .map(|read| {
                    let emit = PreparedEmit::new(read.records(), &config.options);
                    PreparedState { read, emit }
                });
        }

        let executed = match prepared.as_mut() {
            Some(state) => state.read.execute().await,
            None => Ok(()),
        };
        if let Err(err) = executed {
            prepared.take();
            return Err(AssetError::driver("prepared read", err));
        }

        let record = match prepared.as_ref() {
            Some(state) => {
                let batch = state.read.records();
                self.build_record(batch, Some((&state.emit, batch)), &config)
            }
            None => {
                let mut records: Vec<ChannelRecord> = config
                    .readable_channels()
                    .iter()
                    .map(Channel::read_record)
                    .collect();
                self.inner
                    .driver
                    .read(&mut records)
                    .await
                    .map_err(|err| AssetError::driver("read", err))?;
                self.build_record(&records, None, &config)
            }
        };
        drop(prepared);

        let outcome = self.publish(record, &config)?;
        if let Some(metrics) = &self.inner.metrics {
            metrics.observe_poll(&self.inner.name, started.elapsed());
        }
        Ok(outcome)
    }

    /// Handle an inbound envelope: write matching values, then emit a fresh
    /// read of all channels when the asset has any readable channel.
    pub async fn on_wire_receive(&self, envelope: &WireEnvelope) -> Result<EmitOutcome> {
        self.ensure_active()?;
        let config = self.configuration();
        let ctx = self.log_context(config.generation);
        for record in &envelope.records {
            let mut writes = match_writes(record.properties(), config.channels.values());
            if writes.is_empty() {
                continue;
            }
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_writes(&self.inner.name, writes.len());
            }
            if let Err(err) = self.inner.driver.write(&mut writes).await {
                ems_error!(context = ctx, "driver write failed: {err:#}");
                continue;
            }
            for write in writes.iter().filter(|write| !write.is_success()) {
                self.note_failure(write);
                ems_warn!(
                    context = ctx.with_channel(write.channel_name()),
                    "channel write failed: {}",
                    error_text(write.status())
                );
            }
        }
        self.emit_all_read_channels().await
    }

    /// Handle one driver-pushed channel event.
    ///
    /// The configuration snapshot and the change filter pass run under the
    /// same lock [`WireAsset::update`] holds while swapping generations.
    pub async fn on_channel_event(&self, event: ChannelEvent) -> Result<EmitOutcome> {
        if !self.is_active() {
            return Ok(EmitOutcome::Ignored);
        }
        let swap_guard = self.inner.prepared.lock().await;
        let config = self.configuration();
        let known = config
            .channels
            .get(event.channel_name())
            .is_some_and(|channel| channel.enabled);
        if !known {
            let ctx = self.log_context(config.generation);
            ems_debug!(
                context = ctx.with_channel(event.channel_name()),
                "ignoring event for unknown or disabled channel"
            );
            return Ok(EmitOutcome::Ignored);
        }
        if config.options.emit_all_channels {
            drop(swap_guard);
            return self.emit_all_read_channels().await;
        }
        let records = [event.record];
        let record = self.build_record(&records, None, &config);
        drop(swap_guard);
        self.publish(record, &config)
    }

    fn build_record(
        &self,
        records: &[ChannelRecord],
        prepared: Option<(&PreparedEmit, &RecordBatch)>,
        config: &AssetConfiguration,
    ) -> WireRecord {
        for record in records.iter().filter(|record| !record.is_success()) {
            self.note_failure(record);
        }
        if config.options.emit_on_change {
            let passed = self.inner.change_filter.filter(records);
            if let Some(metrics) = &self.inner.metrics {
                metrics.record_suppressed(&self.inner.name, records.len() - passed.len());
            }
            return flatten(&passed, &config.options);
        }
        match prepared {
            Some((plan, batch)) => plan.emit(batch),
            None => flatten(records, &config.options),
        }
    }

    fn publish(&self, record: WireRecord, config: &AssetConfiguration) -> Result<EmitOutcome> {
        let properties = record.len();
        let ctx = self.log_context(config.generation);
        match self.inner.support.emit(record, &config.options) {
            Ok(receivers) => {
                if let Some(metrics) = &self.inner.metrics {
                    metrics.record_emitted(&self.inner.name);
                }
                ems_debug!(context = ctx, "emitted record with {properties} properties");
                Ok(EmitOutcome::Emitted {
                    properties,
                    receivers,
                })
            }
            Err(WireError::EmptyRecord) => {
                if let Some(metrics) = &self.inner.metrics {
                    metrics.record_empty_discarded(&self.inner.name);
                }
                ems_debug!(context = ctx, "discarding empty record");
                Ok(EmitOutcome::Discarded)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn note_failure(&self, record: &ChannelRecord) {
        if let Some(metrics) = &self.inner.metrics {
            metrics.record_channel_failure(&self.inner.name, record.channel_name());
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(AssetError::Inactive {
                asset: self.inner.name.clone(),
            })
        }
    }

    fn log_context(&self, generation: u64) -> LogContext<'_> {
        LogContext::new()
            .with_asset(&self.inner.name)
            .with_driver(self.inner.driver.kind())
            .with_generation(generation)
    }

    async fn register_listeners(&self, config: &AssetConfiguration) {
        let mut handles = self.inner.listeners.lock().await;
        self.release_handles(&mut handles).await;
        let listener: Arc<dyn ChannelListener> = Arc::new(AssetListener {
            asset: Arc::downgrade(&self.inner),
        });
        let ctx = self.log_context(config.generation);
        for channel in config.listened_channels() {
            match self
                .inner
                .driver
                .register_channel_listener(channel, Arc::clone(&listener))
                .await
            {
                Ok(handle) => handles.push(handle),
                Err(err) => ems_warn!(
                    context = ctx.with_channel(&channel.name),
                    "listener registration failed: {err:#}"
                ),
            }
        }
    }

    async fn unregister_listeners(&self) {
        let mut handles = self.inner.listeners.lock().await;
        self.release_handles(&mut handles).await;
    }

    async fn release_handles(&self, handles: &mut Vec<ListenerHandle>) {
        for handle in handles.drain(..) {
            if let Err(err) = self.inner.driver.unregister_channel_listener(handle).await {
                let ctx = self.log_context(self.configuration().generation);
                ems_warn!(context = ctx, "failed to unregister {handle}: {err:#}");
            }
        }
    }
}

struct AssetListener {
    asset: Weak<AssetInner>,
}

#[async_trait]
impl ChannelListener for AssetListener {
    async fn on_channel_event(&self, event: ChannelEvent) {
        let Some(inner) = self.asset.upgrade() else {
            return;
        };
        let asset = WireAsset { inner };
        if let Err(err) = asset.on_channel_event(event).await {
            let ctx = asset.log_context(asset.configuration().generation);
            ems_error!(context = ctx, "channel event handling failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use r_ems_channel::TypedValue;
    use serde_json::json;

    use super::*;
    use crate::sim::SimulatedDriver;

    fn properties(pressure_enabled: bool) -> Properties {
        let mut props = Properties::new();
        props.insert("emit.on.change".into(), json!(true));
        for name in ["temp", "pressure"] {
            props.insert(format!("{name}#+name"), json!(name));
            props.insert(format!("{name}#+type"), json!("READ"));
            props.insert(format!("{name}#+value.type"), json!("INTEGER"));
        }
        props.insert("pressure#+enabled".into(), json!(pressure_enabled));
        props
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn events_racing_an_update_leave_no_stale_filter_entries() {
        let next = properties(false);
        for _ in 0..200 {
            let asset = WireAsset::new("boiler", Arc::new(SimulatedDriver::new()), &properties(true));
            asset.activate().await.expect("activate");

            let racer = asset.clone();
            let event = tokio::spawn(async move {
                let record = ChannelRecord::success("pressure", TypedValue::Integer(10), 0);
                racer.on_channel_event(ChannelEvent::new(record)).await
            });
            asset.update(&next).await.expect("update");
            event.await.expect("event task").expect("event handled");

            assert!(asset.inner.change_filter.is_empty());
        }
    }

    #[tokio::test]
    async fn invalidated_prepared_read_is_rebuilt() {
        let driver = SimulatedDriver::new();
        driver.set_value("temp", TypedValue::Integer(1));
        driver.set_value("pressure", TypedValue::Integer(2));
        let mut props = properties(true);
        props.insert("emit.on.change".into(), json!(false));
        let asset = WireAsset::new("boiler", Arc::new(driver.clone()), &props);
        asset.activate().await.expect("activate");

        asset.emit_all_read_channels().await.expect("first poll");
        asset.invalidate_prepared_read().await;
        asset.emit_all_read_channels().await.expect("second poll");

        assert_eq!(driver.prepared_builds(), 2);
        assert_eq!(driver.prepared_executions(), 2);
    }
}
