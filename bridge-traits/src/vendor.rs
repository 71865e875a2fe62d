//! Vendor Resource Client Contracts
//!
//! One [`VendorResourceClient`] exists per `(vendor, resource kind)`. The sync
//! engine drives it page by page until `next_page` is `None`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VendorError;
use crate::resource::{CloudResource, ResourceKind, SyncScope, Vendor};

/// Opaque vendor pagination cursor (marker, offset, page number or link).
pub type PageToken = String;

pub type VendorResult<T> = std::result::Result<T, VendorError>;

/// One page of a vendor listing.
#[derive(Debug, Clone, Default)]
pub struct ResourcePage {
    pub items: Vec<CloudResource>,
    pub next_page: Option<PageToken>,
}

impl ResourcePage {
    pub fn last(items: Vec<CloudResource>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }

    pub fn with_next(items: Vec<CloudResource>, next_page: Option<PageToken>) -> Self {
        Self { items, next_page }
    }
}

/// Uniform paginated listing over one vendor resource API.
///
/// # Contract
///
/// - `page = None` requests the first page.
/// - Vendors without a cursor return `next_page = None` after the first call.
/// - When `scope.cloud_ids` is set, only those resources are returned.
/// - Authentication and throttling failures are returned unmodified.
/// - A malformed response fails the whole page; partial pages are never returned.
#[async_trait]
pub trait VendorResourceClient: Send + Sync {
    fn vendor(&self) -> Vendor;

    fn kind(&self) -> ResourceKind;

    /// Whether listings are narrowed by `SyncScope::zone`. Regional clients
    /// ignore the zone and always list the whole region.
    fn zonal(&self) -> bool {
        false
    }

    async fn list_page(
        &self,
        scope: &SyncScope,
        page: Option<PageToken>,
    ) -> VendorResult<ResourcePage>;
}

/// Request to bind or unbind an elastic IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EipAssociation {
    pub eip_cloud_id: String,
    pub cvm_cloud_id: String,
    /// Required by vendors that bind EIPs to a NIC (Azure, HuaWei).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_interface_cloud_id: Option<String>,
}

impl EipAssociation {
    pub fn new(eip_cloud_id: impl Into<String>, cvm_cloud_id: impl Into<String>) -> Self {
        Self {
            eip_cloud_id: eip_cloud_id.into(),
            cvm_cloud_id: cvm_cloud_id.into(),
            network_interface_cloud_id: None,
        }
    }

    pub fn with_network_interface(mut self, cloud_id: impl Into<String>) -> Self {
        self.network_interface_cloud_id = Some(cloud_id.into());
        self
    }

    pub fn require_network_interface(&self, vendor: Vendor) -> VendorResult<&str> {
        self.network_interface_cloud_id.as_deref().ok_or_else(|| {
            VendorError::InvalidScope(format!(
                "{} eip association requires network_interface_cloud_id",
                vendor
            ))
        })
    }
}

/// Vendor-side EIP binding operations.
#[async_trait]
pub trait EipAssociationClient: Send + Sync {
    fn vendor(&self) -> Vendor;

    async fn associate(&self, scope: &SyncScope, request: &EipAssociation) -> VendorResult<()>;

    async fn disassociate(&self, scope: &SyncScope, request: &EipAssociation)
        -> VendorResult<()>;
}
