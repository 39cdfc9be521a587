//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Suppression of unchanged channel values."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::HashMap;

use parking_lot::Mutex;
use r_ems_channel::{ChannelRecord, TypedValue};

/// Remembers the last value emitted per channel and drops repeats.
///
/// The whole filter pass runs under one lock, so polling and listener
/// callers can share an instance.
#[derive(Debug, Default)]
pub struct ChangeFilter {
    last_values: Mutex<HashMap<String, TypedValue>>,
}

impl ChangeFilter {
    /// Empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the records that should still be emitted, in input order.
    ///
    /// Failures always pass and forget the cached value. Successes pass only
    /// when the value differs from the cached one, which is then replaced.
    pub fn filter(&self, records: &[ChannelRecord]) -> Vec<ChannelRecord> {
        let mut last_values = self.last_values.lock();
        let mut passed = Vec::with_capacity(records.len());
        for record in records {
            let name = record.channel_name();
            if !record.is_success() {
                last_values.remove(name);
                passed.push(record.clone());
                continue;
            }
            let Some(value) = record.value() else {
                passed.push(record.clone());
                continue;
            };
            if last_values.get(name) == Some(value) {
                continue;
            }
            last_values.insert(name.to_owned(), value.clone());
            passed.push(record.clone());
        }
        passed
    }

    /// Forget every cached value.
    pub fn clear(&self) {
        self.last_values.lock().clear();
    }

    /// Number of cached channels.
    pub fn len(&self) -> usize {
        self.last_values.lock().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.last_values.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use r_ems_channel::ChannelStatus;

    use super::*;

    fn ok(name: &str, value: i32) -> ChannelRecord {
        ChannelRecord::success(name, TypedValue::Integer(value), 0)
    }

    #[test]
    fn repeated_value_is_dropped() {
        let filter = ChangeFilter::new();
        assert_eq!(filter.filter(&[ok("foo", 1)]).len(), 1);
        assert!(filter.filter(&[ok("foo", 1)]).is_empty());
        assert_eq!(filter.filter(&[ok("foo", 2)]).len(), 1);
    }

    #[test]
    fn failure_readmits_next_success() {
        let filter = ChangeFilter::new();
        assert_eq!(filter.filter(&[ok("foo", 1)]).len(), 1);
        let failed = ChannelRecord::failure("foo", ChannelStatus::failure("x"), 0);
        assert_eq!(filter.filter(&[failed.clone()]).len(), 1);
        assert_eq!(filter.filter(&[failed]).len(), 1);
        assert_eq!(filter.filter(&[ok("foo", 1)]).len(), 1);
    }

    #[test]
    fn channels_are_tracked_independently() {
        let filter = ChangeFilter::new();
        let first = filter.filter(&[ok("foo", 1), ok("bar", 1)]);
        assert_eq!(first.len(), 2);
        let second = filter.filter(&[ok("foo", 1), ok("bar", 2)]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].channel_name(), "bar");
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn type_change_counts_as_change() {
        let filter = ChangeFilter::new();
        filter.filter(&[ok("foo", 1)]);
        let long = ChannelRecord::success("foo", TypedValue::Long(1), 0);
        assert_eq!(filter.filter(&[long]).len(), 1);
    }

    #[test]
    fn clear_forgets_values() {
        let filter = ChangeFilter::new();
        filter.filter(&[ok("foo", 1)]);
        filter.clear();
        assert!(filter.is_empty());
        assert_eq!(filter.filter(&[ok("foo", 1)]).len(), 1);
    }

    #[test]
    fn concurrent_callers_emit_each_value_once() {
        let filter = Arc::new(ChangeFilter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let filter = Arc::clone(&filter);
                std::thread::spawn(move || filter.filter(&[ok("foo", 42)]).len())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1);
    }
}
