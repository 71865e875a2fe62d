//! CMDB Client Contract
//!
//! The CMDB mirrors converged compute hosts, partitioned by business id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resource::Vendor;

/// Maximum hosts per add/delete request accepted by the CMDB.
pub const CMDB_HOST_BATCH_LIMIT: usize = 200;

/// CMDB's vendor code for a cloud vendor.
pub fn cmdb_vendor_code(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::Aws => "1",
        Vendor::TCloud => "2",
        Vendor::Gcp => "3",
        Vendor::Azure => "4",
        Vendor::HuaWei => "15",
    }
}

/// Host lifecycle codes understood by the CMDB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmdbHostStatus {
    Unknown,
    Starting,
    Running,
    Stopping,
    Stopped,
    Terminated,
}

impl CmdbHostStatus {
    pub fn code(&self) -> &'static str {
        match self {
            CmdbHostStatus::Unknown => "1",
            CmdbHostStatus::Starting => "2",
            CmdbHostStatus::Running => "3",
            CmdbHostStatus::Stopping => "4",
            CmdbHostStatus::Stopped => "5",
            CmdbHostStatus::Terminated => "6",
        }
    }
}

/// Host payload for `add_cloud_host_to_biz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmdbHost {
    pub bk_cloud_vendor: String,
    pub bk_cloud_inst_id: String,
    pub bk_cloud_host_status: String,
    pub bk_cloud_id: i64,
    pub bk_cloud_region: String,
    pub bk_host_innerip: String,
    pub bk_host_outerip: String,
    pub bk_host_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCloudHostRequest {
    pub bk_biz_id: i64,
    pub host_info: Vec<CmdbHost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCloudHostRequest {
    pub bk_biz_id: i64,
    pub bk_host_ids: Vec<i64>,
}

/// A host already registered in the CMDB.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredHost {
    pub bk_host_id: i64,
    pub bk_cloud_inst_id: String,
}

#[async_trait]
pub trait CmdbClient: Send + Sync {
    /// Register or refresh hosts under a business.
    async fn add_cloud_host_to_biz(&self, request: AddCloudHostRequest) -> Result<Vec<i64>>;

    /// Remove hosts from a business by CMDB host id.
    async fn delete_cloud_host_from_biz(&self, request: DeleteCloudHostRequest) -> Result<()>;

    /// Look up registered hosts of a business by cloud instance id.
    async fn list_biz_hosts(
        &self,
        bk_biz_id: i64,
        vendor: Vendor,
        cloud_inst_ids: &[String],
    ) -> Result<Vec<RegisteredHost>>;
}
