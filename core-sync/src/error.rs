use std::time::Duration;

use bridge_traits::error::VendorError;
use bridge_traits::resource::{ResourceKind, Vendor};
use core_inventory::InventoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Vendor error: {0}")]
    Vendor(#[from] VendorError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("{count} resource(s) slated for deletion are still reported by the vendor: {sample:?}")]
    DeleteVerification { count: usize, sample: Vec<String> },

    #[error("Vendor returned page token {token} twice")]
    PaginationLoop { token: String },

    #[error("No client registered for {vendor} {kind}")]
    UnsupportedResource { vendor: Vendor, kind: ResourceKind },

    #[error("{vendor} does not support {kind} relations")]
    UnsupportedRelation { vendor: Vendor, kind: ResourceKind },

    #[error("Relation endpoint missing: {0}")]
    RelationEndpointMissing(String),

    #[error("Invalid sync scope: {0}")]
    InvalidScope(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Vendor call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("CMDB error: {0}")]
    Cmdb(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl SyncError {
    /// Whether a caller may reasonably run the same pass again.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Vendor(e) => e.is_transient(),
            SyncError::Timeout(_) | SyncError::DeleteVerification { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
