//! ---
//! ems_section: "12-testing-quality-assurance"
//! ems_subsection: "integration-tests"
//! ems_type: "test"
//! ems_scope: "code"
//! ems_description: "Property tests for the wire flattening pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use proptest::prelude::*;
use r_ems_channel::{ChannelRecord, ChannelStatus, DataType, RecordBatch, TypedValue};
use r_ems_wire::{flatten, EmitOptions, PreparedEmit, TimestampMode, ASSET_TIMESTAMP};

#[derive(Debug, Clone)]
struct Sample {
    success: bool,
    value: i64,
    timestamp: i64,
    unit: Option<String>,
}

fn sample() -> impl Strategy<Value = Sample> {
    (
        any::<bool>(),
        any::<i64>(),
        0i64..4_000_000_000_000,
        prop::option::of("[a-zA-Z ]{0,3}"),
    )
        .prop_map(|(success, value, timestamp, unit)| Sample {
            success,
            value,
            timestamp,
            unit,
        })
}

fn deterministic_mode() -> impl Strategy<Value = TimestampMode> {
    prop_oneof![
        Just(TimestampMode::NoTimestamps),
        Just(TimestampMode::PerChannel),
        Just(TimestampMode::SingleDriverGeneratedMax),
        Just(TimestampMode::SingleDriverGeneratedMin),
    ]
}

fn options() -> impl Strategy<Value = EmitOptions> {
    (deterministic_mode(), any::<bool>()).prop_map(|(timestamp_mode, emit_errors)| EmitOptions {
        timestamp_mode,
        emit_errors,
        ..EmitOptions::default()
    })
}

fn apply(record: &mut ChannelRecord, sample: &Sample) {
    if sample.success {
        record.complete(TypedValue::Long(sample.value), sample.timestamp);
    } else {
        record.fail(ChannelStatus::failure("read failed"), sample.timestamp);
    }
    record.set_unit(sample.unit.clone());
}

fn batch_of(len: usize) -> RecordBatch {
    RecordBatch::new(
        (0..len)
            .map(|index| ChannelRecord::read_request(format!("ch{index}"), DataType::Long))
            .collect(),
    )
}

proptest! {
    #[test]
    fn prepared_emit_matches_flatten_across_polls(
        polls in prop::collection::vec(prop::collection::vec(sample(), 4), 1..5),
        options in options(),
    ) {
        let mut batch = batch_of(4);
        let prepared = PreparedEmit::new(&batch, &options);
        for poll in &polls {
            for (record, sample) in batch.records_mut().iter_mut().zip(poll) {
                apply(record, sample);
            }
            prop_assert!(prepared.matches(&batch));
            prop_assert_eq!(prepared.emit(&batch), flatten(&batch, &options));
        }
    }

    #[test]
    fn error_fields_present_only_when_enabled(
        samples in prop::collection::vec(sample(), 0..8),
        options in options(),
    ) {
        let mut batch = batch_of(samples.len());
        for (record, sample) in batch.records_mut().iter_mut().zip(&samples) {
            apply(record, sample);
        }
        let out = flatten(&batch, &options);
        let error_keys = out.keys().filter(|key| key.ends_with("_error")).count();
        if options.emit_errors {
            prop_assert_eq!(error_keys, samples.len());
        } else {
            prop_assert_eq!(error_keys, 0);
        }
    }

    #[test]
    fn failed_records_never_emit_values(
        samples in prop::collection::vec(sample(), 1..8),
        options in options(),
    ) {
        let mut batch = batch_of(samples.len());
        for (record, sample) in batch.records_mut().iter_mut().zip(&samples) {
            apply(record, sample);
        }
        let out = flatten(&batch, &options);
        for (index, sample) in samples.iter().enumerate() {
            let name = format!("ch{index}");
            prop_assert_eq!(out.contains_key(&name), sample.success);
        }
    }

    #[test]
    fn driver_timestamp_is_order_independent(
        samples in prop::collection::vec(sample(), 1..8),
        max in any::<bool>(),
    ) {
        let mode = if max {
            TimestampMode::SingleDriverGeneratedMax
        } else {
            TimestampMode::SingleDriverGeneratedMin
        };
        let options = EmitOptions { timestamp_mode: mode, ..EmitOptions::default() };
        let records: Vec<_> = samples
            .iter()
            .enumerate()
            .map(|(index, sample)| ChannelRecord::success(format!("ch{index}"), TypedValue::Long(sample.value), sample.timestamp))
            .collect();
        let mut reversed = records.clone();
        reversed.reverse();

        let expected = if max {
            samples.iter().map(|s| s.timestamp).max()
        } else {
            samples.iter().map(|s| s.timestamp).min()
        };
        let forward = flatten(&records, &options);
        prop_assert_eq!(forward.get(ASSET_TIMESTAMP).and_then(TypedValue::as_long), expected);
        prop_assert_eq!(forward, flatten(&reversed, &options));
    }
}
