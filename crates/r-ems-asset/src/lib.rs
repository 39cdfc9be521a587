//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Driver-backed wire assets."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Wire assets bind a protocol driver to the gateway record stream.
#![warn(missing_docs)]

pub mod asset;
pub mod driver;
pub mod error;
pub mod sim;

pub use asset::{AssetConfiguration, EmitOutcome, WireAsset, WireAssetBuilder};
pub use driver::{ChannelEvent, ChannelListener, Driver, ListenerHandle, PreparedRead};
pub use error::{AssetError, Result};
pub use sim::{SimulatedDriver, SimulatedFault, SIM_DRIVER_KIND, SIM_INITIAL_KEY};
