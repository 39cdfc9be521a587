//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Errors raised by wire assets."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use r_ems_wire::WireError;

/// Shared result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

/// Errors surfaced by [`WireAsset`](crate::WireAsset) operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The driver failed a whole operation.
    #[error("driver {operation} failed: {source:#}")]
    Driver {
        /// Operation that failed.
        operation: &'static str,
        /// Underlying driver error.
        #[source]
        source: anyhow::Error,
    },
    /// The emit boundary rejected a record.
    #[error(transparent)]
    Wire(#[from] WireError),
    /// The asset was used in a state that does not allow the operation.
    #[error("asset {asset} is not active")]
    Inactive {
        /// Asset name.
        asset: String,
    },
}

impl AssetError {
    pub(crate) fn driver(operation: &'static str, source: anyhow::Error) -> Self {
        AssetError::Driver { operation, source }
    }
}
