//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed values, channel descriptors and channel records."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{Display, EnumString};

use crate::record::ChannelRecord;
use crate::value::DataType;

/// Direction of a channel as seen from the gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ChannelType {
    /// The driver can only read the point.
    Read,
    /// The driver can only write the point.
    Write,
    /// The point supports both directions.
    ReadWrite,
}

impl ChannelType {
    /// Whether reads are allowed on this channel.
    pub fn is_readable(self) -> bool {
        matches!(self, ChannelType::Read | ChannelType::ReadWrite)
    }

    /// Whether writes are allowed on this channel.
    pub fn is_writable(self) -> bool {
        matches!(self, ChannelType::Write | ChannelType::ReadWrite)
    }
}

/// Static descriptor of one point exposed by a driver.
///
/// Names are unique within an asset; the owning asset enforces this when it
/// parses its property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name, used as the key in emitted records.
    pub name: String,
    /// Direction.
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    /// Declared value type.
    pub value_type: DataType,
    /// Disabled channels are neither read, written nor listened to.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Register a driver listener for this channel on activation.
    #[serde(default)]
    pub listen: bool,
    /// Optional engineering unit stamped onto read requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Driver-specific configuration.
    #[serde(default)]
    pub config: IndexMap<String, JsonValue>,
}

fn default_enabled() -> bool {
    true
}

impl Channel {
    /// Create an enabled, non-listening channel with an empty driver config.
    pub fn new(name: impl Into<String>, channel_type: ChannelType, value_type: DataType) -> Self {
        Self {
            name: name.into(),
            channel_type,
            value_type,
            enabled: true,
            listen: false,
            unit: None,
            config: IndexMap::new(),
        }
    }

    /// Builder-style setter for the unit.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Builder-style setter for the listen flag.
    pub fn with_listen(mut self, listen: bool) -> Self {
        self.listen = listen;
        self
    }

    /// Builder-style setter for the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Builder-style insertion of a driver configuration entry.
    pub fn with_config(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Enabled and readable.
    pub fn is_readable(&self) -> bool {
        self.enabled && self.channel_type.is_readable()
    }

    /// Enabled and writable.
    pub fn is_writable(&self) -> bool {
        self.enabled && self.channel_type.is_writable()
    }

    /// Build a read request for this channel, carrying its unit.
    pub fn read_record(&self) -> ChannelRecord {
        let mut record = ChannelRecord::read_request(&self.name, self.value_type);
        if let Some(unit) = &self.unit {
            record.set_unit(Some(unit.clone()));
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_helpers() {
        assert!(ChannelType::Read.is_readable());
        assert!(!ChannelType::Read.is_writable());
        assert!(ChannelType::Write.is_writable());
        assert!(!ChannelType::Write.is_readable());
        assert!(ChannelType::ReadWrite.is_readable() && ChannelType::ReadWrite.is_writable());
        assert_eq!("read_write".parse::<ChannelType>().unwrap(), ChannelType::ReadWrite);
    }

    #[test]
    fn disabled_channel_is_neither_readable_nor_writable() {
        let channel = Channel::new("valve", ChannelType::ReadWrite, DataType::Boolean)
            .with_enabled(false);
        assert!(!channel.is_readable());
        assert!(!channel.is_writable());
    }

    #[test]
    fn read_record_carries_unit() {
        let channel = Channel::new("temp", ChannelType::Read, DataType::Double).with_unit("C");
        let record = channel.read_record();
        assert_eq!(record.channel_name(), "temp");
        assert_eq!(record.value_type(), Some(DataType::Double));
        assert_eq!(record.unit(), Some("C"));
        assert!(record.value().is_none());
    }

    #[test]
    fn deserialises_with_defaults() {
        let channel: Channel = serde_json::from_value(serde_json::json!({
            "name": "speed",
            "type": "WRITE",
            "value_type": "INTEGER"
        }))
        .unwrap();
        assert!(channel.enabled);
        assert!(!channel.listen);
        assert!(channel.unit.is_none());
        assert_eq!(channel.channel_type, ChannelType::Write);
    }
}
