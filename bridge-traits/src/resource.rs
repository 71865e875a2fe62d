//! Vendor-neutral resource contracts shared by the adapters and the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VendorError;
use crate::extension::Extension;

/// Maximum number of cloud ids a single scoped request may carry.
pub const CLOUD_ID_FILTER_LIMIT: usize = 100;

/// Business id of records that have not been assigned by an operator.
pub const UNASSIGNED_BUSINESS: i64 = -1;

// ============================================================================
// Vendor / Resource Kind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    TCloud,
    Aws,
    Gcp,
    Azure,
    HuaWei,
}

impl Vendor {
    pub const ALL: [Vendor; 5] = [
        Vendor::TCloud,
        Vendor::Aws,
        Vendor::Gcp,
        Vendor::Azure,
        Vendor::HuaWei,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::TCloud => "tcloud",
            Vendor::Aws => "aws",
            Vendor::Gcp => "gcp",
            Vendor::Azure => "azure",
            Vendor::HuaWei => "huawei",
        }
    }

    /// Resource kinds this vendor can list.
    pub fn supported_kinds(&self) -> &'static [ResourceKind] {
        match self {
            Vendor::TCloud | Vendor::Aws => {
                &[ResourceKind::Eip, ResourceKind::Cvm, ResourceKind::Disk]
            }
            Vendor::Gcp | Vendor::Azure | Vendor::HuaWei => &[
                ResourceKind::Eip,
                ResourceKind::Cvm,
                ResourceKind::Disk,
                ResourceKind::NetworkInterface,
            ],
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcloud" => Ok(Vendor::TCloud),
            "aws" => Ok(Vendor::Aws),
            "gcp" => Ok(Vendor::Gcp),
            "azure" => Ok(Vendor::Azure),
            "huawei" => Ok(Vendor::HuaWei),
            _ => Err(format!("Unknown vendor: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Eip,
    Cvm,
    Disk,
    NetworkInterface,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Eip,
        ResourceKind::Cvm,
        ResourceKind::Disk,
        ResourceKind::NetworkInterface,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Eip => "eip",
            ResourceKind::Cvm => "cvm",
            ResourceKind::Disk => "disk",
            ResourceKind::NetworkInterface => "network_interface",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eip" => Ok(ResourceKind::Eip),
            "cvm" => Ok(ResourceKind::Cvm),
            "disk" => Ok(ResourceKind::Disk),
            "network_interface" => Ok(ResourceKind::NetworkInterface),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

// ============================================================================
// Sync Scope
// ============================================================================

/// The `(vendor, account, region[, zone])` tuple that bounds one sync pass.
///
/// `cloud_ids` narrows the pass to specific resources. It is used by scoped
/// re-syncs after associate/disassociate and by pre-delete verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncScope {
    pub vendor: Vendor,
    pub account_id: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_ids: Option<Vec<String>>,
}

impl SyncScope {
    pub fn new(vendor: Vendor, account_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            vendor,
            account_id: account_id.into(),
            region: region.into(),
            zone: None,
            resource_group: None,
            cloud_ids: None,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_resource_group(mut self, group: impl Into<String>) -> Self {
        self.resource_group = Some(group.into());
        self
    }

    pub fn with_cloud_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cloud_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Same scope without the cloud id filter.
    pub fn unfiltered(&self) -> Self {
        Self {
            cloud_ids: None,
            ..self.clone()
        }
    }

    /// Same scope widened to the whole region.
    pub fn regional(&self) -> Self {
        Self {
            zone: None,
            ..self.clone()
        }
    }

    /// Whether a cloud id passes this scope's id filter.
    pub fn admits(&self, cloud_id: &str) -> bool {
        match &self.cloud_ids {
            Some(ids) => ids.iter().any(|id| id == cloud_id),
            None => true,
        }
    }

    pub fn validate(&self) -> Result<(), VendorError> {
        if self.account_id.trim().is_empty() {
            return Err(VendorError::InvalidScope("account_id is required".into()));
        }
        if self.region.trim().is_empty() {
            return Err(VendorError::InvalidScope("region is required".into()));
        }
        if self.vendor == Vendor::Azure && self.resource_group.is_none() {
            return Err(VendorError::InvalidScope(
                "azure scopes require a resource_group".into(),
            ));
        }
        if let Some(ids) = &self.cloud_ids {
            if ids.is_empty() {
                return Err(VendorError::InvalidScope("cloud_ids must not be empty".into()));
            }
            if ids.len() > CLOUD_ID_FILTER_LIMIT {
                return Err(VendorError::InvalidScope(format!(
                    "cloud_ids exceeds limit of {} (got {})",
                    CLOUD_ID_FILTER_LIMIT,
                    ids.len()
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Cloud-side Items
// ============================================================================

/// How a vendor refers to another resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum ResourceRef {
    CloudId(String),
    /// Vendors such as GCP link resources by name rather than id.
    Name(String),
}

impl ResourceRef {
    pub fn value(&self) -> &str {
        match self {
            ResourceRef::CloudId(v) | ResourceRef::Name(v) => v,
        }
    }
}

/// The resource this item is bound to, as reported by the vendor.
///
/// EIPs on Azure and HuaWei bind to a network interface rather than directly
/// to an instance; those are resolved to the owning CVM through the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: ResourceKind,
    pub reference: ResourceRef,
}

impl Attachment {
    pub fn instance(cloud_id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Cvm,
            reference: ResourceRef::CloudId(cloud_id.into()),
        }
    }

    pub fn instance_named(name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Cvm,
            reference: ResourceRef::Name(name.into()),
        }
    }

    pub fn network_interface(cloud_id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::NetworkInterface,
            reference: ResourceRef::CloudId(cloud_id.into()),
        }
    }
}

/// A resource a CVM reports as belonging to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelatedResource {
    pub kind: ResourceKind,
    pub reference: ResourceRef,
}

/// One item of a vendor listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudResource {
    pub cloud_id: String,
    pub name: Option<String>,
    pub status: String,
    pub region: String,
    pub zone: Option<String>,
    pub resource_group: Option<String>,
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub related: Vec<RelatedResource>,
    pub extension: Extension,
}

impl CloudResource {
    pub fn new(
        cloud_id: impl Into<String>,
        status: impl Into<String>,
        region: impl Into<String>,
        extension: Extension,
    ) -> Self {
        Self {
            cloud_id: cloud_id.into(),
            name: None,
            status: status.into(),
            region: region.into(),
            zone: None,
            resource_group: None,
            attachment: None,
            related: Vec::new(),
            extension,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        let zone = zone.into();
        self.zone = (!zone.is_empty()).then_some(zone);
        self
    }

    pub fn with_resource_group(mut self, group: impl Into<String>) -> Self {
        self.resource_group = Some(group.into());
        self
    }

    pub fn with_attachment(mut self, attachment: Option<Attachment>) -> Self {
        self.attachment = attachment;
        self
    }

    pub fn with_related(mut self, kind: ResourceKind, reference: ResourceRef) -> Self {
        let related = RelatedResource { kind, reference };
        if !self.related.contains(&related) {
            self.related.push(related);
        }
        self
    }

    /// Related references of one kind.
    pub fn related_of(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceRef> {
        self.related
            .iter()
            .filter(move |r| r.kind == kind)
            .map(|r| &r.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{Extension, TCloudEipExtension};

    fn eip(cloud_id: &str) -> CloudResource {
        CloudResource::new(
            cloud_id,
            "BIND",
            "ap-guangzhou",
            Extension::TCloudEip(TCloudEipExtension::default()),
        )
    }

    #[test]
    fn test_vendor_round_trip() {
        for vendor in Vendor::ALL {
            assert_eq!(vendor.as_str().parse::<Vendor>().unwrap(), vendor);
        }
        assert!("alibaba".parse::<Vendor>().is_err());
    }

    #[test]
    fn test_kind_serde_matches_as_str() {
        let json = serde_json::to_string(&ResourceKind::NetworkInterface).unwrap();
        assert_eq!(json, "\"network_interface\"");
        let json = serde_json::to_string(&Vendor::HuaWei).unwrap();
        assert_eq!(json, "\"huawei\"");
    }

    #[test]
    fn test_supported_kinds() {
        assert!(!Vendor::TCloud
            .supported_kinds()
            .contains(&ResourceKind::NetworkInterface));
        assert!(Vendor::Gcp
            .supported_kinds()
            .contains(&ResourceKind::NetworkInterface));
    }

    #[test]
    fn test_scope_validation() {
        let scope = SyncScope::new(Vendor::TCloud, "acc-1", "ap-guangzhou");
        assert!(scope.validate().is_ok());

        let scope = SyncScope::new(Vendor::TCloud, "", "ap-guangzhou");
        assert!(matches!(scope.validate(), Err(VendorError::InvalidScope(_))));

        let scope = SyncScope::new(Vendor::Azure, "acc-1", "eastus");
        assert!(scope.validate().is_err());
        assert!(scope.with_resource_group("rg-1").validate().is_ok());
    }

    #[test]
    fn test_scope_cloud_id_limit() {
        let ids: Vec<String> = (0..=CLOUD_ID_FILTER_LIMIT).map(|i| format!("eip-{i}")).collect();
        let scope = SyncScope::new(Vendor::Aws, "acc-1", "us-east-1").with_cloud_ids(ids);
        assert!(scope.validate().is_err());

        let scope = SyncScope::new(Vendor::Aws, "acc-1", "us-east-1").with_cloud_ids(["eip-1"]);
        assert!(scope.validate().is_ok());
        assert!(scope.admits("eip-1"));
        assert!(!scope.admits("eip-2"));
        assert!(scope.unfiltered().admits("eip-2"));

        let zoned = scope.with_zone("us-east-1a");
        let regional = zoned.regional();
        assert_eq!(regional.zone, None);
        assert_eq!(regional.cloud_ids, zoned.cloud_ids);
    }

    #[test]
    fn test_related_deduplicates() {
        let cvm = eip("ins-1")
            .with_related(ResourceKind::Disk, ResourceRef::CloudId("disk-1".into()))
            .with_related(ResourceKind::Disk, ResourceRef::CloudId("disk-1".into()))
            .with_related(ResourceKind::Eip, ResourceRef::CloudId("eip-1".into()));

        assert_eq!(cvm.related.len(), 2);
        assert_eq!(cvm.related_of(ResourceKind::Disk).count(), 1);
    }

    #[test]
    fn test_empty_name_is_none() {
        assert_eq!(eip("eip-1").with_name("").name, None);
        assert_eq!(eip("eip-1").with_name("web").name.as_deref(), Some("web"));
    }
}
