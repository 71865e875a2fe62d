//! VPC, ECS and EVS response shapes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// VPC v2.0 publicips
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListPublicipsResponse {
    pub publicips: Vec<Publicip>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Publicip {
    pub id: String,
    pub alias: Option<String>,
    /// FREEZED, BIND_ERROR, BINDING, PENDING_DELETE, PENDING_CREATE,
    /// NOTIFYING, NOTIFY_DELETE, PENDING_UPDATE, DOWN, ACTIVE, ELB, ERROR, VPN
    pub status: String,
    #[serde(rename = "type")]
    pub ip_type: Option<String>,
    pub public_ip_address: Option<String>,
    pub private_ip_address: Option<String>,
    pub port_id: Option<String>,
    pub bandwidth_size: Option<u64>,
    pub bandwidth_share_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdatePublicipRequest {
    pub publicip: UpdatePublicip,
}

/// `port_id: null` unbinds.
#[derive(Debug, Serialize)]
pub struct UpdatePublicip {
    pub port_id: Option<String>,
}

// ============================================================================
// VPC v1 ports
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListPortsResponse {
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Port {
    pub id: String,
    pub name: String,
    /// ACTIVE, BUILD, DOWN
    pub status: String,
    pub mac_address: Option<String>,
    pub network_id: Option<String>,
    pub device_id: Option<String>,
    pub device_owner: Option<String>,
    pub fixed_ips: Vec<FixedIp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixedIp {
    pub ip_address: String,
}

impl Port {
    /// Instance the port is plugged into; other owners (routers, DHCP, ELB)
    /// are not instances.
    pub fn instance_id(&self) -> Option<&str> {
        let owner = self.device_owner.as_deref()?;
        if !owner.starts_with("compute:") {
            return None;
        }
        self.device_id.as_deref().filter(|id| !id.is_empty())
    }
}

// ============================================================================
// ECS cloudservers
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListServersResponse {
    pub count: u64,
    pub servers: Vec<Server>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Server {
    pub id: String,
    pub name: String,
    /// ACTIVE, BUILD, SHUTOFF, REBOOT, ERROR, DELETED ...
    pub status: String,
    pub created: Option<String>,
    pub flavor: Option<IdRef>,
    pub image: Option<IdRef>,
    pub metadata: BTreeMap<String, String>,
    /// Keyed by VPC id
    pub addresses: BTreeMap<String, Vec<ServerAddress>>,
    #[serde(rename = "OS-EXT-AZ:availability_zone")]
    pub availability_zone: Option<String>,
    #[serde(rename = "os-extended-volumes:volumes_attached")]
    pub volumes_attached: Vec<IdRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerAddress {
    pub addr: String,
    /// `fixed` or `floating`
    #[serde(rename = "OS-EXT-IPS:type")]
    pub ip_type: Option<String>,
    #[serde(rename = "OS-EXT-IPS:port_id")]
    pub port_id: Option<String>,
}

impl Server {
    pub fn ips_of_type<'a>(&'a self, ip_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.addresses
            .values()
            .flatten()
            .filter(move |a| a.ip_type.as_deref() == Some(ip_type))
            .map(|a| a.addr.as_str())
    }

    /// Distinct ports behind the fixed addresses.
    pub fn port_ids(&self) -> Vec<String> {
        let mut ports: Vec<String> = Vec::new();
        for address in self.addresses.values().flatten() {
            if address.ip_type.as_deref() != Some("fixed") {
                continue;
            }
            if let Some(port) = address.port_id.as_deref().filter(|p| !p.is_empty()) {
                if !ports.iter().any(|p| p == port) {
                    ports.push(port.to_string());
                }
            }
        }
        ports
    }
}

// ============================================================================
// EVS v2 cloudvolumes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListVolumesResponse {
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub id: String,
    pub name: String,
    /// creating, available, in-use, error, attaching, detaching ...
    pub status: String,
    pub size: u64,
    pub volume_type: Option<String>,
    pub availability_zone: Option<String>,
    /// `"true"` or `"false"`
    pub bootable: Option<String>,
    pub multiattach: bool,
    pub attachments: Vec<VolumeAttachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VolumeAttachment {
    pub server_id: String,
}

// ============================================================================
// Errors
// ============================================================================

/// Services disagree on the error layout; this accepts all three.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorResponse {
    pub error_code: Option<String>,
    pub error_msg: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub error: Option<NestedError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NestedError {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn into_parts(self) -> Option<(String, String)> {
        let nested = self.error.unwrap_or_default();
        let code = self.error_code.or(self.code).or(nested.code)?;
        let message = self
            .error_msg
            .or(self.message)
            .or(nested.message)
            .unwrap_or_default();
        Some((code, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_addresses() {
        let server: Server = serde_json::from_value(serde_json::json!({
            "id": "srv-1",
            "status": "ACTIVE",
            "addresses": {"vpc-1": [
                {"addr": "192.168.0.5", "OS-EXT-IPS:type": "fixed", "OS-EXT-IPS:port_id": "port-1"},
                {"addr": "119.3.3.3", "OS-EXT-IPS:type": "floating", "OS-EXT-IPS:port_id": "port-1"},
                {"addr": "192.168.0.6", "OS-EXT-IPS:type": "fixed", "OS-EXT-IPS:port_id": "port-2"}
            ]},
            "os-extended-volumes:volumes_attached": [{"id": "vol-1"}]
        }))
        .unwrap();

        assert_eq!(server.port_ids(), vec!["port-1", "port-2"]);
        assert_eq!(server.ips_of_type("floating").collect::<Vec<_>>(), vec!["119.3.3.3"]);
        assert_eq!(server.volumes_attached[0].id, "vol-1");
    }

    #[test]
    fn test_error_layouts() {
        let flat: ErrorResponse =
            serde_json::from_str(r#"{"error_code":"VPC.0101","error_msg":"bad"}"#).unwrap();
        assert_eq!(flat.into_parts(), Some(("VPC.0101".into(), "bad".into())));

        let nested: ErrorResponse =
            serde_json::from_str(r#"{"error":{"code":"Ecs.0114","message":"no"}}"#).unwrap();
        assert_eq!(nested.into_parts(), Some(("Ecs.0114".into(), "no".into())));

        let empty: ErrorResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.into_parts(), None);
    }

    #[test]
    fn test_port_instance_only_for_compute_owner() {
        let mut port = Port {
            device_id: Some("srv-1".into()),
            device_owner: Some("compute:cn-north-4a".into()),
            ..Default::default()
        };
        assert_eq!(port.instance_id(), Some("srv-1"));

        port.device_owner = Some("network:router_interface_distributed".into());
        assert_eq!(port.instance_id(), None);
    }
}
