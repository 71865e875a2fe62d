//! Workspace facade crate.
//!
//! Host applications depend on `hcm-sync-workspace` and enable only the
//! vendors they need; each vendor feature maps to the matching provider crate
//! through `core-service`.

#[cfg(any(
    feature = "native-shims",
    feature = "tcloud",
    feature = "aws",
    feature = "gcp",
    feature = "azure",
    feature = "huawei"
))]
pub use core_service::{CoreError, SyncService, SyncServiceBuilder};
