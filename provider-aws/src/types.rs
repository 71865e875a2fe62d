//! EC2 Query API response shapes
//!
//! Lists are wrapped in `<xxxSet><item>...</item></xxxSet>`, see
//! <https://docs.aws.amazon.com/AWSEC2/latest/APIReference/Query-Requests.html>.

use serde::Deserialize;

/// `<xxxSet>` wrapper around repeated `<item>` elements.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemSet<T> {
    #[serde(rename = "item", default)]
    pub items: Vec<T>,
}

impl<T> Default for ItemSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Value of the `Name` tag, which the console shows as the resource name.
pub fn name_tag(tags: &ItemSet<Tag>) -> Option<String> {
    tags.items
        .iter()
        .find(|t| t.key == "Name")
        .map(|t| t.value.clone())
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorResponse {
    #[serde(rename = "Errors")]
    pub errors: ErrorList,
    #[serde(rename = "RequestID")]
    pub request_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ErrorList {
    #[serde(rename = "Error")]
    pub errors: Vec<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiError {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

// ============================================================================
// DescribeAddresses
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DescribeAddressesResponse {
    pub request_id: String,
    pub addresses_set: ItemSet<Address>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub public_ip: Option<String>,
    pub allocation_id: String,
    pub association_id: Option<String>,
    pub domain: Option<String>,
    pub instance_id: Option<String>,
    pub network_interface_id: Option<String>,
    pub private_ip_address: Option<String>,
    pub network_border_group: Option<String>,
    pub tag_set: ItemSet<Tag>,
}

// ============================================================================
// DescribeInstances
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DescribeInstancesResponse {
    pub request_id: String,
    pub reservation_set: ItemSet<Reservation>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Reservation {
    pub instances_set: ItemSet<Instance>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Instance {
    pub instance_id: String,
    pub image_id: Option<String>,
    pub instance_state: InstanceState,
    pub instance_type: Option<String>,
    pub placement: Placement,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub private_ip_address: Option<String>,
    pub ip_address: Option<String>,
    pub launch_time: Option<String>,
    pub block_device_mapping: ItemSet<BlockDevice>,
    pub tag_set: ItemSet<Tag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstanceState {
    /// pending, running, shutting-down, terminated, stopping, stopped
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Placement {
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockDevice {
    pub device_name: Option<String>,
    pub ebs: Option<EbsDevice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EbsDevice {
    pub volume_id: String,
}

// ============================================================================
// DescribeVolumes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DescribeVolumesResponse {
    pub request_id: String,
    pub volume_set: ItemSet<Volume>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Volume {
    pub volume_id: String,
    pub size: u64,
    pub availability_zone: Option<String>,
    /// creating, available, in-use, deleting, deleted, error
    pub status: String,
    pub create_time: Option<String>,
    pub volume_type: Option<String>,
    pub encrypted: bool,
    pub attachment_set: ItemSet<VolumeAttachment>,
    pub tag_set: ItemSet<Tag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeAttachment {
    pub instance_id: String,
    pub state: Option<String>,
}

// ============================================================================
// AssociateAddress / DisassociateAddress
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReturnResponse {
    pub request_id: String,
    #[serde(rename = "return")]
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_volumes() {
        let xml = r#"<DescribeVolumesResponse xmlns="http://ec2.amazonaws.com/doc/2016-11-15/">
            <requestId>r-1</requestId>
            <volumeSet>
                <item>
                    <volumeId>vol-1</volumeId>
                    <size>80</size>
                    <availabilityZone>us-east-1a</availabilityZone>
                    <status>in-use</status>
                    <volumeType>gp3</volumeType>
                    <encrypted>true</encrypted>
                    <attachmentSet>
                        <item><instanceId>i-1</instanceId><state>attached</state></item>
                    </attachmentSet>
                    <tagSet><item><key>Name</key><value>data</value></item></tagSet>
                </item>
                <item>
                    <volumeId>vol-2</volumeId>
                    <size>8</size>
                    <status>available</status>
                    <encrypted>false</encrypted>
                    <attachmentSet/>
                </item>
            </volumeSet>
            <nextToken>tok-2</nextToken>
        </DescribeVolumesResponse>"#;

        let response: DescribeVolumesResponse = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(response.next_token.as_deref(), Some("tok-2"));
        assert_eq!(response.volume_set.items.len(), 2);

        let first = &response.volume_set.items[0];
        assert_eq!(first.size, 80);
        assert!(first.encrypted);
        assert_eq!(first.attachment_set.items[0].instance_id, "i-1");
        assert_eq!(name_tag(&first.tag_set).as_deref(), Some("data"));
        assert!(response.volume_set.items[1].attachment_set.items.is_empty());
    }

    #[test]
    fn test_parse_error_response() {
        let xml = r#"<Response><Errors><Error><Code>AuthFailure</Code><Message>denied</Message></Error></Errors><RequestID>r-9</RequestID></Response>"#;
        let response: ErrorResponse = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(response.errors.errors[0].code, "AuthFailure");
        assert_eq!(response.request_id, "r-9");
    }
}
