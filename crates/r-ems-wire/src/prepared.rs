//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Filler plan cached against a record batch identity."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use r_ems_channel::{BatchId, RecordBatch};

use crate::fillers::{channel_fillers, flatten, ChannelFiller, TimestampAggregator};
use crate::options::EmitOptions;
use crate::record::WireRecord;

/// Filler plan computed once for a [`RecordBatch`] and reused while the same
/// batch is polled again.
///
/// A batch with a different identity falls back to [`flatten`]. The plan
/// belongs to one [`EmitOptions`] value and must be rebuilt when the options
/// change.
#[derive(Debug, Clone)]
pub struct PreparedEmit {
    batch: BatchId,
    options: EmitOptions,
    plan: Vec<Vec<ChannelFiller>>,
}

impl PreparedEmit {
    /// Precompute the fillers for every record of `batch`.
    pub fn new(batch: &RecordBatch, options: &EmitOptions) -> Self {
        let plan = batch
            .iter()
            .map(|record| channel_fillers(record.channel_name(), options))
            .collect();
        Self {
            batch: batch.id(),
            options: *options,
            plan,
        }
    }

    /// Identity of the batch the plan was built for.
    pub fn batch_id(&self) -> BatchId {
        self.batch
    }

    /// Options the plan was built under.
    pub fn options(&self) -> &EmitOptions {
        &self.options
    }

    /// Whether `batch` is the one the plan was built for.
    pub fn matches(&self, batch: &RecordBatch) -> bool {
        batch.id() == self.batch && batch.len() == self.plan.len()
    }

    /// Flatten the current contents of `batch`.
    pub fn emit(&self, batch: &RecordBatch) -> WireRecord {
        if !self.matches(batch) {
            return flatten(batch, &self.options);
        }
        let mut out = WireRecord::new();
        let mut aggregator = TimestampAggregator::new(self.options.timestamp_mode);
        for (record, fillers) in batch.iter().zip(&self.plan) {
            for filler in fillers {
                filler.fill(record, &mut out);
            }
            aggregator.observe(record.timestamp());
        }
        aggregator.finish(&mut out);
        out
    }
}
