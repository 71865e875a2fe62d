//! ARM resource shapes for the Network and Compute providers

use serde::Deserialize;

/// ARM list envelope; `nextLink` is an absolute URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArmList<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SubResource {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Sku {
    pub name: Option<String>,
}

// ============================================================================
// Microsoft.Network/publicIPAddresses
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublicIpAddress {
    pub id: String,
    pub name: String,
    pub location: String,
    pub sku: Option<Sku>,
    pub zones: Vec<String>,
    pub properties: PublicIpProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicIpProperties {
    pub ip_address: Option<String>,
    #[serde(rename = "publicIPAllocationMethod")]
    pub allocation_method: Option<String>,
    pub provisioning_state: Option<String>,
    pub ip_configuration: Option<SubResource>,
}

// ============================================================================
// Microsoft.Compute/virtualMachines
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    pub location: String,
    pub zones: Vec<String>,
    pub properties: VirtualMachineProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VirtualMachineProperties {
    pub vm_id: Option<String>,
    pub hardware_profile: HardwareProfile,
    pub storage_profile: StorageProfile,
    pub network_profile: NetworkProfile,
    pub instance_view: Option<InstanceView>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HardwareProfile {
    pub vm_size: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageProfile {
    pub os_disk: Option<OsDisk>,
    pub data_disks: Vec<DataDisk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OsDisk {
    pub os_type: Option<String>,
    pub managed_disk: Option<SubResource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataDisk {
    pub managed_disk: Option<SubResource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkProfile {
    pub network_interfaces: Vec<SubResource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstanceView {
    pub statuses: Vec<InstanceStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstanceStatus {
    pub code: String,
}

impl VirtualMachine {
    /// `PowerState/running`, `PowerState/deallocated`, ...
    pub fn power_state(&self) -> Option<&str> {
        self.properties
            .instance_view
            .as_ref()?
            .statuses
            .iter()
            .map(|s| s.code.as_str())
            .find(|code| code.starts_with("PowerState/"))
    }
}

// ============================================================================
// Microsoft.Compute/disks
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedDisk {
    pub id: String,
    pub name: String,
    pub location: String,
    pub zones: Vec<String>,
    pub managed_by: Option<String>,
    pub sku: Option<Sku>,
    pub properties: DiskProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiskProperties {
    #[serde(rename = "diskSizeGB")]
    pub disk_size_gb: u64,
    /// Unattached, Attached, Reserved, ActiveSAS, ReadyToUpload ...
    pub disk_state: String,
    pub os_type: Option<String>,
}

// ============================================================================
// Microsoft.Network/networkInterfaces
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NetworkInterface {
    pub id: String,
    pub name: String,
    pub location: String,
    pub properties: NetworkInterfaceProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInterfaceProperties {
    pub mac_address: Option<String>,
    pub primary: Option<bool>,
    pub virtual_machine: Option<SubResource>,
    pub ip_configurations: Vec<IpConfiguration>,
    pub provisioning_state: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IpConfiguration {
    pub id: String,
    pub name: String,
    pub properties: IpConfigurationProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IpConfigurationProperties {
    #[serde(rename = "privateIPAddress")]
    pub private_ip_address: Option<String>,
    #[serde(rename = "publicIPAddress")]
    pub public_ip_address: Option<SubResource>,
    pub primary: Option<bool>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_state() {
        let vm: VirtualMachine = serde_json::from_value(serde_json::json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/vm1",
            "name": "vm1",
            "location": "eastus",
            "properties": {"instanceView": {"statuses": [
                {"code": "ProvisioningState/succeeded"},
                {"code": "PowerState/deallocated"}
            ]}}
        }))
        .unwrap();
        assert_eq!(vm.power_state(), Some("PowerState/deallocated"));
        assert_eq!(VirtualMachine::default().power_state(), None);
    }
}
