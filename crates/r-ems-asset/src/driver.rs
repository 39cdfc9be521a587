//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Driver seams consumed by wire assets."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use r_ems_channel::{Channel, ChannelRecord, RecordBatch};

/// Opaque identifier of a registered channel listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    /// Wrap a driver-assigned identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw identifier.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Asynchronous update pushed by a driver for one channel.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    /// Completed record for the channel.
    pub record: ChannelRecord,
}

impl ChannelEvent {
    /// Wrap a record.
    pub fn new(record: ChannelRecord) -> Self {
        Self { record }
    }

    /// Channel the event belongs to.
    pub fn channel_name(&self) -> &str {
        self.record.channel_name()
    }
}

/// Receiver of driver-pushed channel events.
#[async_trait]
pub trait ChannelListener: Send + Sync {
    /// Handle one event.
    async fn on_channel_event(&self, event: ChannelEvent);
}

/// A read over a fixed channel set whose records are refreshed in place.
///
/// The batch returned by [`PreparedRead::records`] keeps its identity across
/// [`PreparedRead::execute`] calls.
#[async_trait]
pub trait PreparedRead: Send + Sync {
    /// Refresh every record of the batch.
    async fn execute(&mut self) -> anyhow::Result<()>;

    /// Records as of the last execution.
    fn records(&self) -> &RecordBatch;

    /// Whether the read still matches the driver's view of its channels.
    ///
    /// Returning `false` makes the asset drop this read, together with the
    /// emit plan built for its batch, and prepare a new one.
    fn is_valid(&self) -> bool {
        true
    }
}

/// Unified interface implemented by protocol drivers.
///
/// Per-channel failures are reported through each record's status;
/// an `Err` means the whole operation failed, for example on a lost
/// connection.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver kind, used in logs.
    fn kind(&self) -> &str;

    /// Establish the device connection.
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Tear the device connection down.
    async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Receive the channel set of a new asset configuration generation.
    async fn configure(&self, _channels: &[Channel]) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fill each read request in place.
    async fn read(&self, records: &mut [ChannelRecord]) -> anyhow::Result<()>;

    /// Perform each write request, updating its status in place.
    async fn write(&self, records: &mut [ChannelRecord]) -> anyhow::Result<()>;

    /// Start delivering events for `channel` to `listener`.
    async fn register_channel_listener(
        &self,
        channel: &Channel,
        listener: Arc<dyn ChannelListener>,
    ) -> anyhow::Result<ListenerHandle>;

    /// Stop a previously registered listener.
    async fn unregister_channel_listener(&self, handle: ListenerHandle) -> anyhow::Result<()>;

    /// Build a reusable read for `channels`, if the driver supports it.
    fn prepare_read(&self, _channels: &[Channel]) -> Option<Box<dyn PreparedRead>> {
        None
    }
}
