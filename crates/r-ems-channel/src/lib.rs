//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Typed values, channel descriptors and channel records."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Channel model shared by drivers, the wire pipeline and assets.

pub mod batch;
pub mod channel;
pub mod descriptor;
pub mod record;
pub mod value;

pub use batch::{BatchId, RecordBatch};
pub use channel::{Channel, ChannelType};
pub use descriptor::{
    bool_value, parse_channels, AssetDescriptor, ChannelConfigError, Properties,
    ASSET_DESCRIPTION_KEY, DRIVER_PID_KEY,
};
pub use record::{ChannelException, ChannelFlag, ChannelRecord, ChannelStatus};
pub use value::{DataType, TypedValue, ValueParseError};
