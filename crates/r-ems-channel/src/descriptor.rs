//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Asset property bag parsing into channel descriptors."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Flat property bags describe an asset and its channels.
//!
//! Channel entries use keys of the form `<channel key>#<property>`. Reserved
//! properties are prefixed with `+` (`+name`, `+type`, `+value.type`,
//! `+enabled`, `+listen`, `+unit`); every other property is passed through to
//! the driver in [`Channel::config`].

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::channel::{Channel, ChannelType};
use crate::value::DataType;

/// Flat, insertion-ordered property bag.
pub type Properties = IndexMap<String, JsonValue>;

/// Separator between the channel key and the property name.
pub const CHANNEL_PROPERTY_SEPARATOR: char = '#';
/// Prefix marking reserved channel properties.
pub const RESERVED_PROPERTY_PREFIX: char = '+';
/// Asset-level key naming the driver instance.
pub const DRIVER_PID_KEY: &str = "driver.pid";
/// Asset-level key holding the free-form description.
pub const ASSET_DESCRIPTION_KEY: &str = "asset.desc";

const NAME: &str = "+name";
const TYPE: &str = "+type";
const VALUE_TYPE: &str = "+value.type";
const ENABLED: &str = "+enabled";
const LISTEN: &str = "+listen";
const UNIT: &str = "+unit";

/// Raised for an individual channel definition that cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelConfigError {
    /// A required reserved property is absent.
    #[error("channel `{channel_key}` is missing required property `{property}`")]
    MissingProperty {
        /// Grouping key of the definition.
        channel_key: String,
        /// Missing property.
        property: &'static str,
    },
    /// A reserved property holds an unusable value.
    #[error("channel `{channel_key}` has invalid `{property}`: {reason}")]
    InvalidProperty {
        /// Grouping key of the definition.
        channel_key: String,
        /// Offending property.
        property: &'static str,
        /// Diagnostic.
        reason: String,
    },
    /// Another definition already uses the same channel name.
    #[error("channel name `{name}` declared by `{channel_key}` is already in use")]
    DuplicateName {
        /// Grouping key of the rejected definition.
        channel_key: String,
        /// Conflicting name.
        name: String,
    },
}

/// Asset-level view of a property bag.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssetDescriptor {
    /// Driver instance the asset binds to.
    pub driver_pid: Option<String>,
    /// Description shown to operators.
    pub description: Option<String>,
    /// Valid channels keyed by name, in declaration order.
    pub channels: IndexMap<String, Channel>,
}

impl AssetDescriptor {
    /// Parse the asset-level keys and every channel definition.
    pub fn from_properties(properties: &Properties) -> Self {
        Self {
            driver_pid: string_property(properties, DRIVER_PID_KEY),
            description: string_property(properties, ASSET_DESCRIPTION_KEY),
            channels: parse_channels(properties),
        }
    }
}

fn string_property(properties: &Properties, key: &str) -> Option<String> {
    properties
        .get(key)
        .and_then(JsonValue::as_str)
        .map(str::to_owned)
}

/// Group channel properties by channel key, preserving first-seen order.
pub fn group_channel_properties(properties: &Properties) -> IndexMap<String, Properties> {
    let mut grouped: IndexMap<String, Properties> = IndexMap::new();
    for (key, value) in properties {
        let Some((channel_key, property)) = key.split_once(CHANNEL_PROPERTY_SEPARATOR) else {
            continue;
        };
        if channel_key.is_empty() || property.is_empty() {
            continue;
        }
        grouped
            .entry(channel_key.to_owned())
            .or_default()
            .insert(property.to_owned(), value.clone());
    }
    grouped
}

/// Parse every channel definition in the bag.
///
/// Invalid definitions and duplicate names are skipped with a warning; the
/// first definition of a name wins.
pub fn parse_channels(properties: &Properties) -> IndexMap<String, Channel> {
    let mut channels = IndexMap::new();
    for (channel_key, entries) in group_channel_properties(properties) {
        let channel = match parse_channel(&channel_key, &entries) {
            Ok(channel) => channel,
            Err(err) => {
                warn!(channel_key = %channel_key, error = %err, "skipping invalid channel definition");
                continue;
            }
        };
        if channels.contains_key(&channel.name) {
            let err = ChannelConfigError::DuplicateName {
                channel_key,
                name: channel.name,
            };
            warn!(error = %err, "skipping duplicate channel definition");
            continue;
        }
        channels.insert(channel.name.clone(), channel);
    }
    channels
}

/// Parse one channel definition from its grouped properties.
pub fn parse_channel(channel_key: &str, entries: &Properties) -> Result<Channel, ChannelConfigError> {
    let name = required_str(channel_key, entries, NAME)?;
    if name.trim().is_empty() {
        return Err(invalid(channel_key, NAME, "name is blank"));
    }
    let channel_type = required_str(channel_key, entries, TYPE)?
        .parse::<ChannelType>()
        .map_err(|err| invalid(channel_key, TYPE, err.to_string()))?;
    let value_type = required_str(channel_key, entries, VALUE_TYPE)?
        .parse::<DataType>()
        .map_err(|err| invalid(channel_key, VALUE_TYPE, err.to_string()))?;
    let enabled = optional_bool(channel_key, entries, ENABLED)?.unwrap_or(true);
    let listen = optional_bool(channel_key, entries, LISTEN)?.unwrap_or(false);
    let unit = match entries.get(UNIT) {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(unit)) if unit.trim().is_empty() => None,
        Some(JsonValue::String(unit)) => Some(unit.clone()),
        Some(other) => return Err(invalid(channel_key, UNIT, format!("expected a string, got {other}"))),
    };

    let config = entries
        .iter()
        .filter(|(key, _)| !key.starts_with(RESERVED_PROPERTY_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(Channel {
        name: name.to_owned(),
        channel_type,
        value_type,
        enabled,
        listen,
        unit,
        config,
    })
}

fn invalid(channel_key: &str, property: &'static str, reason: impl Into<String>) -> ChannelConfigError {
    ChannelConfigError::InvalidProperty {
        channel_key: channel_key.to_owned(),
        property,
        reason: reason.into(),
    }
}

fn required_str<'a>(
    channel_key: &str,
    entries: &'a Properties,
    property: &'static str,
) -> Result<&'a str, ChannelConfigError> {
    match entries.get(property) {
        None | Some(JsonValue::Null) => Err(ChannelConfigError::MissingProperty {
            channel_key: channel_key.to_owned(),
            property,
        }),
        Some(JsonValue::String(value)) => Ok(value.as_str()),
        Some(other) => Err(invalid(channel_key, property, format!("expected a string, got {other}"))),
    }
}

/// Read a boolean given either as a JSON bool or as a `"true"`/`"false"` string.
pub fn bool_value(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(flag) => Some(*flag),
        JsonValue::String(text) if text.trim().eq_ignore_ascii_case("true") => Some(true),
        JsonValue::String(text) if text.trim().eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

fn optional_bool(
    channel_key: &str,
    entries: &Properties,
    property: &'static str,
) -> Result<Option<bool>, ChannelConfigError> {
    match entries.get(property) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => bool_value(value)
            .map(Some)
            .ok_or_else(|| invalid(channel_key, property, format!("expected a boolean, got {value}"))),
    }
}
