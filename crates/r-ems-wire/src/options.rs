//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Emission options parsed from asset property bags."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use r_ems_channel::{bool_value, Properties};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{Display, EnumIter, EnumString};
use tracing::warn;

/// Property key for [`EmitOptions::emit_all_channels`].
pub const EMIT_ALL_CHANNELS: &str = "emit.all.channels";
/// Property key for [`EmitOptions::timestamp_mode`].
pub const TIMESTAMP_MODE: &str = "timestamp.mode";
/// Property key for [`EmitOptions::emit_errors`].
pub const EMIT_ERRORS: &str = "emit.errors";
/// Property key for [`EmitOptions::emit_on_change`].
pub const EMIT_ON_CHANGE: &str = "emit.on.change";
/// Property key for [`EmitOptions::emit_empty_envelopes`].
pub const EMIT_EMPTY_ENVELOPES: &str = "emit.empty.envelopes";

/// Policy for timestamps attached to emitted records.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TimestampMode {
    /// No timestamp fields at all.
    NoTimestamps,
    /// One `<channel>_timestamp` field per record.
    #[default]
    PerChannel,
    /// One `assetTimestamp` taken from the wall clock at flatten time.
    SingleAssetGenerated,
    /// One `assetTimestamp` holding the latest record timestamp.
    SingleDriverGeneratedMax,
    /// One `assetTimestamp` holding the earliest record timestamp.
    SingleDriverGeneratedMin,
}

impl TimestampMode {
    /// Whether per-record timestamps are emitted.
    pub fn is_per_channel(self) -> bool {
        self == TimestampMode::PerChannel
    }
}

/// Emission policy of one configuration generation.
///
/// Replaced wholesale on reconfiguration; never mutated in place by the
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitOptions {
    /// On a channel event, read and emit every readable channel.
    pub emit_all_channels: bool,
    /// Timestamp policy.
    pub timestamp_mode: TimestampMode,
    /// Emit `<channel>_error` fields.
    pub emit_errors: bool,
    /// Suppress successful reads whose value did not change.
    pub emit_on_change: bool,
    /// Allow emission of records without properties.
    pub emit_empty_envelopes: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            emit_all_channels: false,
            timestamp_mode: TimestampMode::PerChannel,
            emit_errors: false,
            emit_on_change: false,
            emit_empty_envelopes: true,
        }
    }
}

impl EmitOptions {
    /// Extract the options from an asset property bag.
    ///
    /// Absent or malformed entries fall back to the defaults; an
    /// unrecognised timestamp mode falls back to [`TimestampMode::PerChannel`].
    pub fn from_properties(properties: &Properties) -> Self {
        let defaults = Self::default();
        Self {
            emit_all_channels: flag(properties, EMIT_ALL_CHANNELS, defaults.emit_all_channels),
            timestamp_mode: timestamp_mode(properties),
            emit_errors: flag(properties, EMIT_ERRORS, defaults.emit_errors),
            emit_on_change: flag(properties, EMIT_ON_CHANGE, defaults.emit_on_change),
            emit_empty_envelopes: flag(
                properties,
                EMIT_EMPTY_ENVELOPES,
                defaults.emit_empty_envelopes,
            ),
        }
    }
}

fn flag(properties: &Properties, key: &str, default: bool) -> bool {
    match properties.get(key) {
        None | Some(JsonValue::Null) => default,
        Some(value) => bool_value(value).unwrap_or_else(|| {
            warn!(key, value = %value, default, "invalid boolean option, using default");
            default
        }),
    }
}

fn timestamp_mode(properties: &Properties) -> TimestampMode {
    let Some(value) = properties.get(TIMESTAMP_MODE) else {
        return TimestampMode::default();
    };
    value
        .as_str()
        .and_then(|mode| mode.trim().parse::<TimestampMode>().ok())
        .unwrap_or_else(|| {
            warn!(value = %value, "unrecognised timestamp mode, using PER_CHANNEL");
            TimestampMode::default()
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bag(entries: &[(&str, JsonValue)]) -> Properties {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn defaults_when_absent() {
        let options = EmitOptions::from_properties(&Properties::new());
        assert_eq!(options, EmitOptions::default());
        assert!(options.emit_empty_envelopes);
        assert_eq!(options.timestamp_mode, TimestampMode::PerChannel);
    }

    #[test]
    fn parses_every_key() {
        let options = EmitOptions::from_properties(&bag(&[
            (EMIT_ALL_CHANNELS, json!(true)),
            (TIMESTAMP_MODE, json!("SINGLE_DRIVER_GENERATED_MIN")),
            (EMIT_ERRORS, json!("true")),
            (EMIT_ON_CHANGE, json!(true)),
            (EMIT_EMPTY_ENVELOPES, json!(false)),
        ]));
        assert!(options.emit_all_channels);
        assert_eq!(options.timestamp_mode, TimestampMode::SingleDriverGeneratedMin);
        assert!(options.emit_errors);
        assert!(options.emit_on_change);
        assert!(!options.emit_empty_envelopes);
    }

    #[test]
    fn invalid_values_fall_back() {
        let options = EmitOptions::from_properties(&bag(&[
            (TIMESTAMP_MODE, json!("EVERY_SECOND")),
            (EMIT_EMPTY_ENVELOPES, json!("sometimes")),
            (EMIT_ERRORS, json!(3)),
        ]));
        assert_eq!(options.timestamp_mode, TimestampMode::PerChannel);
        assert!(options.emit_empty_envelopes);
        assert!(!options.emit_errors);
    }
}
