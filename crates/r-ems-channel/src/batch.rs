//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed values, channel descriptors and channel records."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::record::ChannelRecord;

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`RecordBatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(u64);

impl BatchId {
    fn next() -> Self {
        Self(NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Ordered list of channel records with a stable identity.
///
/// The set of records is fixed at construction; drivers may only update the
/// records in place. Cloning produces a new identity, so a clone never
/// matches a plan prepared for the source batch.
#[derive(Debug)]
pub struct RecordBatch {
    id: BatchId,
    records: Vec<ChannelRecord>,
}

impl RecordBatch {
    /// Wrap a record list under a fresh identity.
    pub fn new(records: Vec<ChannelRecord>) -> Self {
        Self {
            id: BatchId::next(),
            records,
        }
    }

    /// Identity handle.
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Records in order.
    pub fn records(&self) -> &[ChannelRecord] {
        &self.records
    }

    /// Mutable access for in-place refresh. The slice cannot grow or shrink.
    pub fn records_mut(&mut self) -> &mut [ChannelRecord] {
        &mut self.records
    }

    /// Consume the batch and return the records.
    pub fn into_records(self) -> Vec<ChannelRecord> {
        self.records
    }
}

impl Clone for RecordBatch {
    fn clone(&self) -> Self {
        Self::new(self.records.clone())
    }
}

impl Deref for RecordBatch {
    type Target = [ChannelRecord];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl From<Vec<ChannelRecord>> for RecordBatch {
    fn from(records: Vec<ChannelRecord>) -> Self {
        Self::new(records)
    }
}
