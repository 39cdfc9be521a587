//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Flattening of channel records into wire records."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Flattening engine.
//!
//! Every record contributes up to three fillers (value, per-channel
//! timestamp, error) in that order. After all records, at most one
//! `assetTimestamp` field is added according to the [`TimestampMode`].

use chrono::Utc;
use r_ems_channel::{ChannelRecord, ChannelStatus, TypedValue};

use crate::options::{EmitOptions, TimestampMode};
use crate::record::WireRecord;

/// Key of the aggregate timestamp field.
pub const ASSET_TIMESTAMP: &str = "assetTimestamp";
/// Suffix of unit fields.
pub const UNIT_SUFFIX: &str = "_unit";
/// Suffix of per-channel timestamp fields.
pub const TIMESTAMP_SUFFIX: &str = "_timestamp";
/// Suffix of error fields.
pub const ERROR_SUFFIX: &str = "_error";
/// Error text used when a failure carries no detail.
pub const ERROR_NOT_SPECIFIED: &str = "ERROR NOT SPECIFIED";

/// One precomputed field writer for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFiller {
    /// Writes the value, and the unit when present, on success.
    Value {
        /// Key of the value field.
        value_key: String,
        /// Key of the unit field.
        unit_key: String,
    },
    /// Writes the record timestamp as a long.
    Timestamp {
        /// Key of the timestamp field.
        key: String,
    },
    /// Writes the error description, empty on success.
    Error {
        /// Key of the error field.
        key: String,
    },
}

impl ChannelFiller {
    /// Apply this filler to `record`, writing into `out`.
    pub fn fill(&self, record: &ChannelRecord, out: &mut WireRecord) {
        match self {
            ChannelFiller::Value {
                value_key,
                unit_key,
            } => {
                if !record.is_success() {
                    return;
                }
                if let Some(value) = record.value() {
                    out.insert(value_key.clone(), value.clone());
                }
                if let Some(unit) = record.unit().filter(|unit| !unit.trim().is_empty()) {
                    out.insert(unit_key.clone(), TypedValue::String(unit.to_owned()));
                }
            }
            ChannelFiller::Timestamp { key } => {
                out.insert(key.clone(), TypedValue::Long(record.timestamp()));
            }
            ChannelFiller::Error { key } => {
                out.insert(key.clone(), TypedValue::String(error_text(record.status())));
            }
        }
    }
}

/// Fillers for one channel under the given options, in application order.
pub fn channel_fillers(channel_name: &str, options: &EmitOptions) -> Vec<ChannelFiller> {
    let mut fillers = Vec::with_capacity(3);
    fillers.push(ChannelFiller::Value {
        value_key: channel_name.to_owned(),
        unit_key: format!("{channel_name}{UNIT_SUFFIX}"),
    });
    if options.timestamp_mode.is_per_channel() {
        fillers.push(ChannelFiller::Timestamp {
            key: format!("{channel_name}{TIMESTAMP_SUFFIX}"),
        });
    }
    if options.emit_errors {
        fillers.push(ChannelFiller::Error {
            key: format!("{channel_name}{ERROR_SUFFIX}"),
        });
    }
    fillers
}

/// Text of the `_error` field for a status.
pub fn error_text(status: &ChannelStatus) -> String {
    if status.is_success() {
        return String::new();
    }
    match (&status.exception_message, &status.exception) {
        (Some(message), Some(exception)) => format!("{message} {exception}"),
        (Some(message), None) => message.clone(),
        (None, Some(exception)) => exception.to_string(),
        (None, None) => ERROR_NOT_SPECIFIED.to_owned(),
    }
}

/// Order-independent fold producing the `assetTimestamp` field.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TimestampAggregator {
    mode: TimestampMode,
    folded: Option<i64>,
}

impl TimestampAggregator {
    pub(crate) fn new(mode: TimestampMode) -> Self {
        Self { mode, folded: None }
    }

    pub(crate) fn observe(&mut self, timestamp: i64) {
        self.folded = match (self.mode, self.folded) {
            (TimestampMode::SingleDriverGeneratedMax, Some(current)) => Some(current.max(timestamp)),
            (TimestampMode::SingleDriverGeneratedMin, Some(current)) => Some(current.min(timestamp)),
            (TimestampMode::SingleDriverGeneratedMax | TimestampMode::SingleDriverGeneratedMin, None) => {
                Some(timestamp)
            }
            (_, folded) => folded,
        };
    }

    pub(crate) fn finish(self, out: &mut WireRecord) {
        let timestamp = match self.mode {
            TimestampMode::NoTimestamps | TimestampMode::PerChannel => None,
            TimestampMode::SingleAssetGenerated => Some(Utc::now().timestamp_millis()),
            TimestampMode::SingleDriverGeneratedMax | TimestampMode::SingleDriverGeneratedMin => {
                self.folded
            }
        };
        if let Some(timestamp) = timestamp {
            out.insert(ASSET_TIMESTAMP, TypedValue::Long(timestamp));
        }
    }
}

/// Flatten `records` into one wire record.
///
/// Never fails: an empty input yields an empty record, or one holding only
/// a wall-clock `assetTimestamp`.
pub fn flatten(records: &[ChannelRecord], options: &EmitOptions) -> WireRecord {
    let mut out = WireRecord::new();
    let mut aggregator = TimestampAggregator::new(options.timestamp_mode);
    for record in records {
        for filler in channel_fillers(record.channel_name(), options) {
            filler.fill(record, &mut out);
        }
        aggregator.observe(record.timestamp());
    }
    aggregator.finish(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use r_ems_channel::ChannelStatus;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("device offline")]
    struct Offline;

    fn options(mode: TimestampMode, emit_errors: bool) -> EmitOptions {
        EmitOptions {
            timestamp_mode: mode,
            emit_errors,
            ..EmitOptions::default()
        }
    }

    #[test]
    fn success_emits_value_and_unit() {
        let records = vec![ChannelRecord::success("temp", TypedValue::Double(21.0), 5).with_unit("C")];
        let out = flatten(&records, &options(TimestampMode::NoTimestamps, false));
        assert_eq!(out.get("temp"), Some(&TypedValue::Double(21.0)));
        assert_eq!(out.get("temp_unit"), Some(&TypedValue::from("C")));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn blank_unit_is_ignored() {
        let records = vec![ChannelRecord::success("temp", TypedValue::Double(21.0), 5).with_unit("  ")];
        let out = flatten(&records, &options(TimestampMode::NoTimestamps, false));
        assert!(!out.contains_key("temp_unit"));
    }

    #[test]
    fn failure_suppresses_value_but_keeps_timestamp() {
        let records = vec![ChannelRecord::failure("temp", ChannelStatus::failure("timeout"), 9).with_unit("C")];
        let out = flatten(&records, &options(TimestampMode::PerChannel, false));
        assert!(!out.contains_key("temp"));
        assert!(!out.contains_key("temp_unit"));
        assert_eq!(out.get("temp_timestamp"), Some(&TypedValue::Long(9)));
    }

    #[test]
    fn error_text_precedence() {
        assert_eq!(error_text(&ChannelStatus::success()), "");
        assert_eq!(error_text(&ChannelStatus::failure("bad crc")), "bad crc");
        assert_eq!(
            error_text(&ChannelStatus::failure_with(Offline, Some("read failed".to_owned()))),
            "read failed device offline"
        );
        assert_eq!(
            error_text(&ChannelStatus::failure_with(Offline, None)),
            "device offline"
        );
        assert_eq!(
            error_text(&ChannelStatus::unspecified_failure()),
            ERROR_NOT_SPECIFIED
        );
    }

    #[test]
    fn error_fields_follow_toggle() {
        let records = vec![
            ChannelRecord::success("a", TypedValue::Integer(1), 1),
            ChannelRecord::failure("b", ChannelStatus::unspecified_failure(), 2),
        ];
        let with_errors = flatten(&records, &options(TimestampMode::NoTimestamps, true));
        assert_eq!(with_errors.get("a_error"), Some(&TypedValue::from("")));
        assert_eq!(
            with_errors.get("b_error"),
            Some(&TypedValue::from(ERROR_NOT_SPECIFIED))
        );

        let without = flatten(&records, &options(TimestampMode::NoTimestamps, false));
        assert!(without.keys().all(|key| !key.ends_with(ERROR_SUFFIX)));
    }

    #[test]
    fn aggregate_timestamp_modes() {
        let records = vec![
            ChannelRecord::success("A", TypedValue::Integer(1), 100),
            ChannelRecord::failure("B", ChannelStatus::failure("x"), 250),
        ];

        let max = flatten(&records, &options(TimestampMode::SingleDriverGeneratedMax, false));
        assert_eq!(max.get(ASSET_TIMESTAMP), Some(&TypedValue::Long(250)));

        let min = flatten(&records, &options(TimestampMode::SingleDriverGeneratedMin, false));
        assert_eq!(min.get(ASSET_TIMESTAMP), Some(&TypedValue::Long(100)));

        let per_channel = flatten(&records, &options(TimestampMode::PerChannel, false));
        assert!(!per_channel.contains_key(ASSET_TIMESTAMP));
        assert_eq!(per_channel.get("A_timestamp"), Some(&TypedValue::Long(100)));
        assert_eq!(per_channel.get("B_timestamp"), Some(&TypedValue::Long(250)));

        let none = flatten(&records, &options(TimestampMode::NoTimestamps, false));
        assert!(none.keys().all(|key| !key.contains("imestamp")));
    }

    #[test]
    fn aggregate_is_order_independent() {
        let forward = vec![
            ChannelRecord::success("A", TypedValue::Integer(1), 300),
            ChannelRecord::success("B", TypedValue::Integer(2), 100),
            ChannelRecord::success("C", TypedValue::Integer(3), 200),
        ];
        let mut backward = forward.clone();
        backward.reverse();
        for mode in [
            TimestampMode::SingleDriverGeneratedMax,
            TimestampMode::SingleDriverGeneratedMin,
        ] {
            assert_eq!(
                flatten(&forward, &options(mode, true)),
                flatten(&backward, &options(mode, true))
            );
        }
    }

    #[test]
    fn asset_generated_uses_wall_clock() {
        let before = Utc::now().timestamp_millis();
        let out = flatten(&[], &options(TimestampMode::SingleAssetGenerated, false));
        let after = Utc::now().timestamp_millis();
        let stamp = out.get(ASSET_TIMESTAMP).and_then(TypedValue::as_long).unwrap();
        assert!(before <= stamp && stamp <= after);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn empty_input_with_driver_mode_yields_empty_record() {
        let out = flatten(&[], &options(TimestampMode::SingleDriverGeneratedMax, true));
        assert!(out.is_empty());
    }

    #[test]
    fn filler_plan_order() {
        let plan = channel_fillers("x", &options(TimestampMode::PerChannel, true));
        assert!(matches!(plan[0], ChannelFiller::Value { .. }));
        assert!(matches!(plan[1], ChannelFiller::Timestamp { .. }));
        assert!(matches!(plan[2], ChannelFiller::Error { .. }));
        assert_eq!(channel_fillers("x", &options(TimestampMode::NoTimestamps, false)).len(), 1);
    }
}
