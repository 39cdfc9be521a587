//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "In-memory driver simulating channel values."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use r_ems_channel::{Channel, ChannelRecord, ChannelStatus, RecordBatch, TypedValue};
use r_ems_common::now_millis;
use tracing::{debug, warn};

use crate::driver::{ChannelEvent, ChannelListener, Driver, ListenerHandle, PreparedRead};

/// Driver kind served by [`SimulatedDriver`].
pub const SIM_DRIVER_KIND: &str = "sim";
/// Channel config key holding the initial simulated value.
pub const SIM_INITIAL_KEY: &str = "sim.initial";

/// Error attached to records failed by an injected fault.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SimulatedFault(String);

struct Registration {
    channel: String,
    unit: Option<String>,
    listener: Arc<dyn ChannelListener>,
}

#[derive(Default)]
struct SimState {
    values: RwLock<HashMap<String, TypedValue>>,
    faults: RwLock<HashMap<String, String>>,
    listeners: Mutex<BTreeMap<ListenerHandle, Registration>>,
    next_listener: AtomicU64,
    written: Mutex<Vec<(String, TypedValue)>>,
    connected: AtomicBool,
    offline: AtomicBool,
    prepared_disabled: AtomicBool,
    prepared_executions: AtomicU64,
    prepared_builds: AtomicU64,
    prepared_epoch: AtomicU64,
}

/// In-memory driver keeping one value per channel name.
///
/// Supports injected per-channel faults, a whole-device offline switch,
/// listener fan-out and prepared reads. Clones share state.
#[derive(Clone, Default)]
pub struct SimulatedDriver {
    state: Arc<SimState>,
}

impl fmt::Debug for SimulatedDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedDriver")
            .field("values", &self.state.values.read().len())
            .field("listeners", &self.state.listeners.lock().len())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl SimulatedDriver {
    /// Empty driver with prepared reads enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style toggle for prepared read support.
    pub fn with_prepared_reads(self, enabled: bool) -> Self {
        self.state.prepared_disabled.store(!enabled, Ordering::SeqCst);
        self
    }

    /// Set the current value of a channel.
    pub fn set_value(&self, channel: impl Into<String>, value: TypedValue) {
        self.state.values.write().insert(channel.into(), value);
    }

    /// Current value of a channel.
    pub fn value(&self, channel: &str) -> Option<TypedValue> {
        self.state.values.read().get(channel).cloned()
    }

    /// Make every operation on `channel` fail with `message`.
    pub fn inject_fault(&self, channel: impl Into<String>, message: impl Into<String>) {
        self.state.faults.write().insert(channel.into(), message.into());
    }

    /// Remove an injected fault.
    pub fn clear_fault(&self, channel: &str) {
        self.state.faults.write().remove(channel);
    }

    /// Make whole read and write operations fail.
    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, Ordering::SeqCst);
    }

    /// Whether `connect` was called more recently than `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Every successful write so far, in order.
    pub fn written(&self) -> Vec<(String, TypedValue)> {
        self.state.written.lock().clone()
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.state.listeners.lock().len()
    }

    /// Number of prepared read executions so far.
    pub fn prepared_executions(&self) -> u64 {
        self.state.prepared_executions.load(Ordering::SeqCst)
    }

    /// Number of prepared reads built so far.
    pub fn prepared_builds(&self) -> u64 {
        self.state.prepared_builds.load(Ordering::SeqCst)
    }

    /// Mark every outstanding prepared read as stale.
    pub fn invalidate_prepared(&self) {
        self.state.prepared_epoch.fetch_add(1, Ordering::SeqCst);
        debug!("prepared reads invalidated");
    }

    /// Update `channel` and notify its listeners. Returns the number notified.
    pub async fn emit_event(&self, channel: &str, value: TypedValue) -> usize {
        self.set_value(channel, value.clone());
        let now = now_millis();
        self.notify(channel, |unit| {
            let record = ChannelRecord::success(channel, value.clone(), now);
            match unit {
                Some(unit) => record.with_unit(unit),
                None => record,
            }
        })
        .await
    }

    /// Notify listeners of `channel` about a failure. Returns the number notified.
    pub async fn emit_failure_event(&self, channel: &str, message: &str) -> usize {
        let now = now_millis();
        self.notify(channel, |_| {
            ChannelRecord::failure(channel, ChannelStatus::failure(message), now)
        })
        .await
    }

    async fn notify<F>(&self, channel: &str, build: F) -> usize
    where
        F: Fn(Option<String>) -> ChannelRecord,
    {
        let targets: Vec<_> = self
            .state
            .listeners
            .lock()
            .values()
            .filter(|registration| registration.channel == channel)
            .map(|registration| (registration.unit.clone(), Arc::clone(&registration.listener)))
            .collect();
        for (unit, listener) in &targets {
            listener
                .on_channel_event(ChannelEvent::new(build(unit.clone())))
                .await;
        }
        targets.len()
    }

    fn ensure_online(&self) -> anyhow::Result<()> {
        if self.state.offline.load(Ordering::SeqCst) {
            anyhow::bail!("simulated device offline");
        }
        Ok(())
    }

    fn fill_read(&self, record: &mut ChannelRecord) {
        let now = now_millis();
        let name = record.channel_name().to_owned();
        if let Some(message) = self.state.faults.read().get(&name) {
            record.fail(
                ChannelStatus::failure_with(
                    SimulatedFault(message.clone()),
                    Some("read failed:".to_owned()),
                ),
                now,
            );
            return;
        }
        let values = self.state.values.read();
        match values.get(&name) {
            None => record.fail(
                ChannelStatus::failure(format!("no simulated value for channel {name}")),
                now,
            ),
            Some(value)
                if record
                    .value_type()
                    .is_some_and(|expected| expected != value.data_type()) =>
            {
                record.fail(
                    ChannelStatus::failure(format!(
                        "simulated value of type {} does not match the channel type",
                        value.data_type()
                    )),
                    now,
                )
            }
            Some(value) => record.complete(value.clone(), now),
        }
    }

    fn perform_write(&self, record: &mut ChannelRecord) {
        let now = now_millis();
        let name = record.channel_name().to_owned();
        if let Some(message) = self.state.faults.read().get(&name) {
            record.set_status(ChannelStatus::failure_with(
                SimulatedFault(message.clone()),
                Some("write failed:".to_owned()),
            ));
            record.set_timestamp(now);
            return;
        }
        let Some(value) = record.value().cloned() else {
            record.set_status(ChannelStatus::failure("write request without value"));
            record.set_timestamp(now);
            return;
        };
        self.state.values.write().insert(name.clone(), value.clone());
        self.state.written.lock().push((name, value));
        record.set_status(ChannelStatus::success());
        record.set_timestamp(now);
    }
}

#[async_trait]
impl Driver for SimulatedDriver {
    fn kind(&self) -> &str {
        SIM_DRIVER_KIND
    }

    async fn connect(&self) -> anyhow::Result<()> {
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.state.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn configure(&self, channels: &[Channel]) -> anyhow::Result<()> {
        let mut values = self.state.values.write();
        for channel in channels {
            let Some(initial) = channel.config.get(SIM_INITIAL_KEY) else {
                continue;
            };
            if values.contains_key(&channel.name) {
                continue;
            }
            match TypedValue::from_json(channel.value_type, initial) {
                Ok(value) => {
                    values.insert(channel.name.clone(), value);
                }
                Err(err) => {
                    warn!(channel = %channel.name, error = %err, "ignoring invalid simulated initial value");
                }
            }
        }
        Ok(())
    }

    async fn read(&self, records: &mut [ChannelRecord]) -> anyhow::Result<()> {
        self.ensure_online()?;
        for record in records.iter_mut() {
            self.fill_read(record);
        }
        Ok(())
    }

    async fn write(&self, records: &mut [ChannelRecord]) -> anyhow::Result<()> {
        self.ensure_online()?;
        for record in records.iter_mut() {
            self.perform_write(record);
        }
        Ok(())
    }

    async fn register_channel_listener(
        &self,
        channel: &Channel,
        listener: Arc<dyn ChannelListener>,
    ) -> anyhow::Result<ListenerHandle> {
        let handle = ListenerHandle::new(self.state.next_listener.fetch_add(1, Ordering::SeqCst));
        self.state.listeners.lock().insert(
            handle,
            Registration {
                channel: channel.name.clone(),
                unit: channel.unit.clone(),
                listener,
            },
        );
        debug!(channel = %channel.name, %handle, "listener registered");
        Ok(handle)
    }

    async fn unregister_channel_listener(&self, handle: ListenerHandle) -> anyhow::Result<()> {
        match self.state.listeners.lock().remove(&handle) {
            Some(_) => Ok(()),
            None => anyhow::bail!("unknown listener {handle}"),
        }
    }

    fn prepare_read(&self, channels: &[Channel]) -> Option<Box<dyn PreparedRead>> {
        if self.state.prepared_disabled.load(Ordering::SeqCst) {
            return None;
        }
        let batch = RecordBatch::new(channels.iter().map(Channel::read_record).collect());
        self.state.prepared_builds.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(SimulatedPreparedRead {
            driver: self.clone(),
            batch,
            epoch: self.state.prepared_epoch.load(Ordering::SeqCst),
        }))
    }
}

struct SimulatedPreparedRead {
    driver: SimulatedDriver,
    batch: RecordBatch,
    epoch: u64,
}

#[async_trait]
impl PreparedRead for SimulatedPreparedRead {
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.driver.ensure_online()?;
        self.driver
            .state
            .prepared_executions
            .fetch_add(1, Ordering::SeqCst);
        for record in self.batch.records_mut() {
            self.driver.fill_read(record);
        }
        Ok(())
    }

    fn records(&self) -> &RecordBatch {
        &self.batch
    }

    fn is_valid(&self) -> bool {
        self.driver.state.prepared_epoch.load(Ordering::SeqCst) == self.epoch
    }
}

#[cfg(test)]
mod tests {
    use r_ems_channel::{ChannelType, DataType};
    use serde_json::json;

    use super::*;

    struct Collector(Mutex<Vec<ChannelEvent>>);

    #[async_trait]
    impl ChannelListener for Collector {
        async fn on_channel_event(&self, event: ChannelEvent) {
            self.0.lock().push(event);
        }
    }

    fn temp() -> Channel {
        Channel::new("temp", ChannelType::Read, DataType::Double).with_unit("C")
    }

    #[tokio::test]
    async fn configure_seeds_initial_values() {
        let driver = SimulatedDriver::new();
        let channels = vec![
            temp().with_config(SIM_INITIAL_KEY, json!(21.5)),
            Channel::new("bad", ChannelType::Read, DataType::Short)
                .with_config(SIM_INITIAL_KEY, json!("not a number")),
        ];
        driver.configure(&channels).await.unwrap();
        assert_eq!(driver.value("temp"), Some(TypedValue::Double(21.5)));
        assert_eq!(driver.value("bad"), None);

        driver.set_value("temp", TypedValue::Double(30.0));
        driver.configure(&channels).await.unwrap();
        assert_eq!(driver.value("temp"), Some(TypedValue::Double(30.0)));
    }

    #[tokio::test]
    async fn read_fills_records_and_reports_faults() {
        let driver = SimulatedDriver::new();
        driver.set_value("temp", TypedValue::Double(20.0));
        let mut records = vec![
            temp().read_record(),
            ChannelRecord::read_request("missing", DataType::Integer),
        ];
        driver.read(&mut records).await.unwrap();
        assert_eq!(records[0].value(), Some(&TypedValue::Double(20.0)));
        assert_eq!(records[0].unit(), Some("C"));
        assert!(!records[1].is_success());

        driver.inject_fault("temp", "sensor broken");
        driver.read(&mut records).await.unwrap();
        assert!(!records[0].is_success());
        assert_eq!(
            records[0].status().exception.as_ref().map(|err| err.to_string()),
            Some("sensor broken".to_owned())
        );

        driver.set_offline(true);
        assert!(driver.read(&mut records).await.is_err());
    }

    #[tokio::test]
    async fn type_mismatch_fails_the_record() {
        let driver = SimulatedDriver::new();
        driver.set_value("temp", TypedValue::Integer(20));
        let mut records = vec![temp().read_record()];
        driver.read(&mut records).await.unwrap();
        assert!(!records[0].is_success());
    }

    #[tokio::test]
    async fn writes_update_values_and_status() {
        let driver = SimulatedDriver::new();
        let mut records = vec![ChannelRecord::write_request("speed", TypedValue::Integer(5))];
        driver.write(&mut records).await.unwrap();
        assert!(records[0].is_success());
        assert_eq!(driver.value("speed"), Some(TypedValue::Integer(5)));
        assert_eq!(driver.written(), vec![("speed".to_owned(), TypedValue::Integer(5))]);
    }

    #[tokio::test]
    async fn listeners_receive_events_with_unit() {
        let driver = SimulatedDriver::new();
        let collector = Arc::new(Collector(Mutex::new(Vec::new())));
        let handle = driver
            .register_channel_listener(&temp(), collector.clone())
            .await
            .unwrap();
        assert_eq!(driver.emit_event("temp", TypedValue::Double(1.0)).await, 1);
        assert_eq!(driver.emit_event("other", TypedValue::Double(1.0)).await, 0);
        {
            let events = collector.0.lock();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].record.unit(), Some("C"));
        }

        driver.unregister_channel_listener(handle).await.unwrap();
        assert!(driver.unregister_channel_listener(handle).await.is_err());
        assert_eq!(driver.emit_event("temp", TypedValue::Double(2.0)).await, 0);
    }

    #[tokio::test]
    async fn prepared_read_keeps_batch_identity() {
        let driver = SimulatedDriver::new();
        driver.set_value("temp", TypedValue::Double(1.0));
        let mut prepared = driver.prepare_read(&[temp()]).expect("prepared reads enabled");
        let id = prepared.records().id();

        prepared.execute().await.unwrap();
        driver.set_value("temp", TypedValue::Double(2.0));
        prepared.execute().await.unwrap();

        assert_eq!(prepared.records().id(), id);
        assert_eq!(prepared.records()[0].value(), Some(&TypedValue::Double(2.0)));
        assert_eq!(driver.prepared_executions(), 2);
        assert_eq!(driver.prepared_builds(), 1);
        assert!(prepared.is_valid());

        driver.invalidate_prepared();
        assert!(!prepared.is_valid());
        let fresh = driver.prepare_read(&[temp()]).expect("prepared reads enabled");
        assert!(fresh.is_valid());
        assert_ne!(fresh.records().id(), id);
        assert_eq!(driver.prepared_builds(), 2);

        let plain = SimulatedDriver::new().with_prepared_reads(false);
        assert!(plain.prepare_read(&[temp()]).is_none());
    }
}
