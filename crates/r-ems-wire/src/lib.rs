//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Wire record emission pipeline."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Conversion between channel records and the flat wire records exchanged
//! with the dataflow topology.

pub mod change;
pub mod fillers;
pub mod options;
pub mod prepared;
pub mod record;
pub mod support;
pub mod write_match;

/// Shared result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors raised at the wire emit boundary.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The record has no properties and empty envelopes are disabled.
    #[error("refusing to emit an empty wire record")]
    EmptyRecord,
    /// Wrapper for JSON serialization problems.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub use change::ChangeFilter;
pub use fillers::{channel_fillers, error_text, flatten, ChannelFiller, ASSET_TIMESTAMP};
pub use options::{EmitOptions, TimestampMode};
pub use prepared::PreparedEmit;
pub use record::{WireEnvelope, WireProperties, WireRecord};
pub use support::{WireSupport, DEFAULT_CHANNEL_CAPACITY};
pub use write_match::match_writes;
