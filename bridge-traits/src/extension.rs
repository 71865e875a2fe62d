//! # Vendor Extension Schemas
//!
//! Each `(vendor, kind)` pair carries a vendor-specific document next to the
//! vendor-neutral fields of a resource. The documents form a closed, tagged
//! union so that every schema goes through one codec path:
//!
//! ```rust,ignore
//! let raw = ExtensionCodec::encode(&resource.extension)?;
//! let ext = ExtensionCodec::decode(Vendor::TCloud, ResourceKind::Eip, &raw)?;
//! ```
//!
//! Stored form: `{"schema": "tcloud.eip", "data": { ... }}`.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::resource::{ResourceKind, Vendor};

// ============================================================================
// TCloud
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TCloudEipExtension {
    pub public_ip: Option<String>,
    pub address_type: Option<String>,
    pub bandwidth: Option<u64>,
    pub internet_charge_type: Option<String>,
    pub internet_service_provider: Option<String>,
    pub network_interface_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TCloudCvmExtension {
    pub instance_type: Option<String>,
    pub image_id: Option<String>,
    pub os_name: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub private_ips: Vec<String>,
    pub public_ips: Vec<String>,
    pub charge_type: Option<String>,
    pub created_time: Option<String>,
    pub expired_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TCloudDiskExtension {
    pub disk_size_gb: u64,
    pub disk_type: Option<String>,
    pub disk_usage: Option<String>,
    pub charge_type: Option<String>,
    pub encrypted: bool,
}

// ============================================================================
// AWS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsEipExtension {
    pub public_ip: Option<String>,
    pub allocation_id: Option<String>,
    pub association_id: Option<String>,
    pub domain: Option<String>,
    pub network_interface_id: Option<String>,
    pub private_ip: Option<String>,
    pub network_border_group: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsCvmExtension {
    pub instance_type: Option<String>,
    pub image_id: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub launch_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsDiskExtension {
    pub size_gb: u64,
    pub volume_type: Option<String>,
    pub encrypted: bool,
    pub create_time: Option<String>,
}

// ============================================================================
// GCP
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpEipExtension {
    pub address: Option<String>,
    pub address_type: Option<String>,
    pub network_tier: Option<String>,
    pub self_link: Option<String>,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpCvmExtension {
    pub machine_type: Option<String>,
    pub self_link: Option<String>,
    pub private_ips: Vec<String>,
    pub public_ips: Vec<String>,
    pub creation_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpDiskExtension {
    pub size_gb: u64,
    pub disk_type: Option<String>,
    pub self_link: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpNetworkInterfaceExtension {
    pub nic_name: String,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
    pub network_ip: Option<String>,
    pub nat_ips: Vec<String>,
}

// ============================================================================
// Azure
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureEipExtension {
    pub ip_address: Option<String>,
    pub allocation_method: Option<String>,
    pub sku: Option<String>,
    pub ip_configuration_id: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureCvmExtension {
    pub vm_id: Option<String>,
    pub vm_size: Option<String>,
    pub os_type: Option<String>,
    pub network_interface_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureDiskExtension {
    pub size_gb: u64,
    pub sku: Option<String>,
    pub os_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureNetworkInterfaceExtension {
    pub mac_address: Option<String>,
    pub primary: bool,
    pub private_ips: Vec<String>,
    pub public_ip_ids: Vec<String>,
}

// ============================================================================
// HuaWei
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuaWeiEipExtension {
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub port_id: Option<String>,
    pub ip_type: Option<String>,
    pub bandwidth_size: Option<u64>,
    pub bandwidth_share_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuaWeiCvmExtension {
    pub flavor_id: Option<String>,
    pub image_id: Option<String>,
    pub vpc_id: Option<String>,
    pub private_ips: Vec<String>,
    pub public_ips: Vec<String>,
    pub created: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuaWeiDiskExtension {
    pub size_gb: u64,
    pub volume_type: Option<String>,
    pub bootable: bool,
    pub multiattach: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuaWeiNetworkInterfaceExtension {
    pub mac_address: Option<String>,
    pub network_id: Option<String>,
    pub device_owner: Option<String>,
    pub fixed_ips: Vec<String>,
}

// ============================================================================
// Union + Codec
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schema", content = "data")]
pub enum Extension {
    #[serde(rename = "tcloud.eip")]
    TCloudEip(TCloudEipExtension),
    #[serde(rename = "tcloud.cvm")]
    TCloudCvm(TCloudCvmExtension),
    #[serde(rename = "tcloud.disk")]
    TCloudDisk(TCloudDiskExtension),
    #[serde(rename = "aws.eip")]
    AwsEip(AwsEipExtension),
    #[serde(rename = "aws.cvm")]
    AwsCvm(AwsCvmExtension),
    #[serde(rename = "aws.disk")]
    AwsDisk(AwsDiskExtension),
    #[serde(rename = "gcp.eip")]
    GcpEip(GcpEipExtension),
    #[serde(rename = "gcp.cvm")]
    GcpCvm(GcpCvmExtension),
    #[serde(rename = "gcp.disk")]
    GcpDisk(GcpDiskExtension),
    #[serde(rename = "gcp.network_interface")]
    GcpNetworkInterface(GcpNetworkInterfaceExtension),
    #[serde(rename = "azure.eip")]
    AzureEip(AzureEipExtension),
    #[serde(rename = "azure.cvm")]
    AzureCvm(AzureCvmExtension),
    #[serde(rename = "azure.disk")]
    AzureDisk(AzureDiskExtension),
    #[serde(rename = "azure.network_interface")]
    AzureNetworkInterface(AzureNetworkInterfaceExtension),
    #[serde(rename = "huawei.eip")]
    HuaWeiEip(HuaWeiEipExtension),
    #[serde(rename = "huawei.cvm")]
    HuaWeiCvm(HuaWeiCvmExtension),
    #[serde(rename = "huawei.disk")]
    HuaWeiDisk(HuaWeiDiskExtension),
    #[serde(rename = "huawei.network_interface")]
    HuaWeiNetworkInterface(HuaWeiNetworkInterfaceExtension),
}

impl Extension {
    /// The `(vendor, kind)` key this schema belongs to.
    pub fn key(&self) -> (Vendor, ResourceKind) {
        use ResourceKind::*;
        match self {
            Extension::TCloudEip(_) => (Vendor::TCloud, Eip),
            Extension::TCloudCvm(_) => (Vendor::TCloud, Cvm),
            Extension::TCloudDisk(_) => (Vendor::TCloud, Disk),
            Extension::AwsEip(_) => (Vendor::Aws, Eip),
            Extension::AwsCvm(_) => (Vendor::Aws, Cvm),
            Extension::AwsDisk(_) => (Vendor::Aws, Disk),
            Extension::GcpEip(_) => (Vendor::Gcp, Eip),
            Extension::GcpCvm(_) => (Vendor::Gcp, Cvm),
            Extension::GcpDisk(_) => (Vendor::Gcp, Disk),
            Extension::GcpNetworkInterface(_) => (Vendor::Gcp, NetworkInterface),
            Extension::AzureEip(_) => (Vendor::Azure, Eip),
            Extension::AzureCvm(_) => (Vendor::Azure, Cvm),
            Extension::AzureDisk(_) => (Vendor::Azure, Disk),
            Extension::AzureNetworkInterface(_) => (Vendor::Azure, NetworkInterface),
            Extension::HuaWeiEip(_) => (Vendor::HuaWei, Eip),
            Extension::HuaWeiCvm(_) => (Vendor::HuaWei, Cvm),
            Extension::HuaWeiDisk(_) => (Vendor::HuaWei, Disk),
            Extension::HuaWeiNetworkInterface(_) => (Vendor::HuaWei, NetworkInterface),
        }
    }

    /// Schema tag in `vendor.kind` form.
    pub fn schema(&self) -> String {
        let (vendor, kind) = self.key();
        format!("{}.{}", vendor, kind)
    }

    /// Public IPv4 addresses the schema exposes, used when mirroring hosts.
    pub fn public_ips(&self) -> Vec<String> {
        match self {
            Extension::TCloudCvm(e) => e.public_ips.clone(),
            Extension::AwsCvm(e) => e.public_ip.iter().cloned().collect(),
            Extension::GcpCvm(e) => e.public_ips.clone(),
            Extension::HuaWeiCvm(e) => e.public_ips.clone(),
            _ => Vec::new(),
        }
    }

    /// Private IPv4 addresses the schema exposes, used when mirroring hosts.
    pub fn private_ips(&self) -> Vec<String> {
        match self {
            Extension::TCloudCvm(e) => e.private_ips.clone(),
            Extension::AwsCvm(e) => e.private_ip.iter().cloned().collect(),
            Extension::GcpCvm(e) => e.private_ips.clone(),
            Extension::HuaWeiCvm(e) => e.private_ips.clone(),
            _ => Vec::new(),
        }
    }
}

/// Single (de)serialization path for every extension schema.
pub struct ExtensionCodec;

impl ExtensionCodec {
    pub fn encode(extension: &Extension) -> Result<String> {
        serde_json::to_string(extension)
            .map_err(|e| BridgeError::Codec(format!("encode {}: {}", extension.schema(), e)))
    }

    /// Decode a stored document and check it carries the expected tag.
    pub fn decode(vendor: Vendor, kind: ResourceKind, raw: &str) -> Result<Extension> {
        let extension: Extension = serde_json::from_str(raw)
            .map_err(|e| BridgeError::Codec(format!("decode {}.{}: {}", vendor, kind, e)))?;

        if extension.key() != (vendor, kind) {
            return Err(BridgeError::Codec(format!(
                "schema mismatch: expected {}.{}, found {}",
                vendor,
                kind,
                extension.schema()
            )));
        }

        Ok(extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_form_is_tagged() {
        let ext = Extension::TCloudEip(TCloudEipExtension {
            public_ip: Some("1.2.3.4".into()),
            bandwidth: Some(10),
            ..Default::default()
        });

        let raw = ExtensionCodec::encode(&ext).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schema"], "tcloud.eip");
        assert_eq!(value["data"]["public_ip"], "1.2.3.4");
    }

    #[test]
    fn test_decode_checks_key() {
        let ext = Extension::AwsDisk(AwsDiskExtension {
            size_gb: 100,
            ..Default::default()
        });
        let raw = ExtensionCodec::encode(&ext).unwrap();

        let decoded = ExtensionCodec::decode(Vendor::Aws, ResourceKind::Disk, &raw).unwrap();
        assert_eq!(decoded, ext);

        let err = ExtensionCodec::decode(Vendor::Gcp, ResourceKind::Disk, &raw).unwrap_err();
        assert!(err.to_string().contains("schema mismatch"));
    }

    #[test]
    fn test_decode_tolerates_missing_fields() {
        let raw = r#"{"schema":"huawei.eip","data":{"port_id":"port-1"}}"#;
        let decoded = ExtensionCodec::decode(Vendor::HuaWei, ResourceKind::Eip, raw).unwrap();
        match decoded {
            Extension::HuaWeiEip(e) => {
                assert_eq!(e.port_id.as_deref(), Some("port-1"));
                assert!(e.public_ip.is_none());
            }
            other => panic!("unexpected schema {}", other.schema()),
        }
    }

    #[test]
    fn test_unknown_schema_rejected() {
        let raw = r#"{"schema":"alibaba.eip","data":{}}"#;
        assert!(ExtensionCodec::decode(Vendor::Aws, ResourceKind::Eip, raw).is_err());
    }

    #[test]
    fn test_schema_names_follow_key() {
        let ext = Extension::AzureNetworkInterface(AzureNetworkInterfaceExtension::default());
        assert_eq!(ext.schema(), "azure.network_interface");
    }

    #[test]
    fn test_host_addresses() {
        let ext = Extension::AwsCvm(AwsCvmExtension {
            private_ip: Some("10.0.0.4".into()),
            public_ip: Some("54.1.2.3".into()),
            ..Default::default()
        });
        assert_eq!(ext.private_ips(), vec!["10.0.0.4".to_string()]);
        assert_eq!(ext.public_ips(), vec!["54.1.2.3".to_string()]);
    }
}
