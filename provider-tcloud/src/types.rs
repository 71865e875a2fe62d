//! TencentCloud API 3.0 request and response types
//!
//! Field names follow the API's PascalCase. Every response is wrapped in a
//! `{"Response": {...}}` envelope which carries `Error` on failure.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "Response")]
    pub response: ResponseBody<T>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseBody<T> {
    #[serde(rename = "Error")]
    pub error: Option<ApiError>,
    #[serde(rename = "RequestId", default)]
    pub request_id: String,
    #[serde(flatten)]
    pub data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Requests
// ============================================================================

/// Offset/limit listing, optionally narrowed to ids.
///
/// The id filter key differs per action, so it is passed as a flattened map.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListRequest {
    pub offset: u64,
    pub limit: u64,
    #[serde(flatten)]
    pub ids: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssociateAddressRequest<'a> {
    pub address_id: &'a str,
    pub instance_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisassociateAddressRequest<'a> {
    pub address_id: &'a str,
}

// ============================================================================
// vpc: DescribeAddresses
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeAddressesResponse {
    pub total_count: u64,
    pub address_set: Vec<Address>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Address {
    pub address_id: String,
    pub address_name: Option<String>,
    /// CREATING, BINDING, BIND, UNBINDING, UNBIND, OFFLINING, BIND_ENI
    pub address_status: String,
    pub address_ip: Option<String>,
    pub instance_id: Option<String>,
    pub network_interface_id: Option<String>,
    pub address_type: Option<String>,
    pub bandwidth: Option<u64>,
    pub internet_charge_type: Option<String>,
    pub internet_service_provider: Option<String>,
}

// ============================================================================
// cvm: DescribeInstances
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeInstancesResponse {
    pub total_count: u64,
    pub instance_set: Vec<Instance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Instance {
    pub instance_id: String,
    pub instance_name: Option<String>,
    /// PENDING, RUNNING, STOPPED, SHUTDOWN, TERMINATING ...
    pub instance_state: String,
    pub placement: Placement,
    pub instance_type: Option<String>,
    pub image_id: Option<String>,
    pub os_name: Option<String>,
    pub virtual_private_cloud: Option<VirtualPrivateCloud>,
    pub private_ip_addresses: Option<Vec<String>>,
    pub public_ip_addresses: Option<Vec<String>>,
    pub instance_charge_type: Option<String>,
    pub created_time: Option<String>,
    pub expired_time: Option<String>,
    pub system_disk: Option<InstanceDisk>,
    pub data_disks: Option<Vec<InstanceDisk>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Placement {
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VirtualPrivateCloud {
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InstanceDisk {
    pub disk_id: Option<String>,
}

// ============================================================================
// cbs: DescribeDisks
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeDisksResponse {
    pub total_count: u64,
    pub disk_set: Vec<Disk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Disk {
    pub disk_id: String,
    pub disk_name: Option<String>,
    /// UNATTACHED, ATTACHING, ATTACHED, DETACHING ...
    pub disk_state: String,
    pub placement: Placement,
    pub disk_size: u64,
    pub disk_type: Option<String>,
    pub disk_usage: Option<String>,
    pub disk_charge_type: Option<String>,
    pub encrypt: bool,
    pub attached: bool,
    pub instance_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Empty {}
