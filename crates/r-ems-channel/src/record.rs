//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed values, channel descriptors and channel records."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::error::Error as StdError;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::value::{DataType, TypedValue};

/// Shared, type-erased error attached to a failed channel operation.
pub type ChannelException = Arc<dyn StdError + Send + Sync + 'static>;

/// Outcome flag of a channel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelFlag {
    /// The operation completed.
    Success,
    /// The operation failed; see the status details.
    Failure,
}

/// Status of one read or write attempt.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    /// Outcome flag.
    pub flag: ChannelFlag,
    /// Underlying error, if the driver captured one.
    pub exception: Option<ChannelException>,
    /// Human-readable failure description.
    pub exception_message: Option<String>,
}

impl ChannelStatus {
    /// Successful status without details.
    pub fn success() -> Self {
        Self {
            flag: ChannelFlag::Success,
            exception: None,
            exception_message: None,
        }
    }

    /// Failure status carrying only a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            flag: ChannelFlag::Failure,
            exception: None,
            exception_message: Some(message.into()),
        }
    }

    /// Failure status carrying an error object and an optional message.
    pub fn failure_with<E>(exception: E, message: Option<String>) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            flag: ChannelFlag::Failure,
            exception: Some(Arc::new(exception)),
            exception_message: message,
        }
    }

    /// Failure status without any detail.
    pub fn unspecified_failure() -> Self {
        Self {
            flag: ChannelFlag::Failure,
            exception: None,
            exception_message: None,
        }
    }

    /// Status of a request the driver has not processed yet.
    pub fn pending() -> Self {
        Self::failure("channel not processed by driver")
    }

    /// Whether the flag is [`ChannelFlag::Success`].
    pub fn is_success(&self) -> bool {
        self.flag == ChannelFlag::Success
    }
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self::pending()
    }
}

/// Result of one read or write attempt on a channel.
///
/// The channel name is fixed at construction. Drivers fill value, status and
/// timestamp in place, which lets a prepared read refresh the same records on
/// every poll.
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    channel_name: String,
    value_type: Option<DataType>,
    value: Option<TypedValue>,
    status: ChannelStatus,
    timestamp: i64,
    unit: Option<String>,
}

impl ChannelRecord {
    /// Build a read request for the named channel.
    pub fn read_request(channel_name: impl Into<String>, value_type: DataType) -> Self {
        Self {
            channel_name: channel_name.into(),
            value_type: Some(value_type),
            value: None,
            status: ChannelStatus::pending(),
            timestamp: 0,
            unit: None,
        }
    }

    /// Build a write request carrying the value to write.
    pub fn write_request(channel_name: impl Into<String>, value: TypedValue) -> Self {
        Self {
            channel_name: channel_name.into(),
            value_type: Some(value.data_type()),
            value: Some(value),
            status: ChannelStatus::pending(),
            timestamp: 0,
            unit: None,
        }
    }

    /// Build a completed successful record.
    pub fn success(channel_name: impl Into<String>, value: TypedValue, timestamp: i64) -> Self {
        Self {
            channel_name: channel_name.into(),
            value_type: Some(value.data_type()),
            value: Some(value),
            status: ChannelStatus::success(),
            timestamp,
            unit: None,
        }
    }

    /// Build a completed failed record.
    pub fn failure(channel_name: impl Into<String>, status: ChannelStatus, timestamp: i64) -> Self {
        Self {
            channel_name: channel_name.into(),
            value_type: None,
            value: None,
            status,
            timestamp,
            unit: None,
        }
    }

    /// Builder-style setter for the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Name of the channel this record belongs to.
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// Expected value type, when known.
    pub fn value_type(&self) -> Option<DataType> {
        self.value_type
    }

    /// Current value, if any.
    pub fn value(&self) -> Option<&TypedValue> {
        self.value.as_ref()
    }

    /// Current status.
    pub fn status(&self) -> &ChannelStatus {
        &self.status
    }

    /// Timestamp in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Unit attached to this record.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Whether the status flag is success.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Replace the value.
    pub fn set_value(&mut self, value: TypedValue) {
        self.value = Some(value);
    }

    /// Drop the value.
    pub fn clear_value(&mut self) {
        self.value = None;
    }

    /// Replace the status.
    pub fn set_status(&mut self, status: ChannelStatus) {
        self.status = status;
    }

    /// Replace the timestamp.
    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    /// Replace the unit.
    pub fn set_unit(&mut self, unit: Option<String>) {
        self.unit = unit;
    }

    /// Mark the record successful with the given value.
    pub fn complete(&mut self, value: TypedValue, timestamp: i64) {
        self.value = Some(value);
        self.status = ChannelStatus::success();
        self.timestamp = timestamp;
    }

    /// Mark the record failed; any previous value is dropped.
    pub fn fail(&mut self, status: ChannelStatus, timestamp: i64) {
        self.value = None;
        self.status = status;
        self.timestamp = timestamp;
    }
}
