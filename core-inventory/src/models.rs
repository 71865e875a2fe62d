//! Domain models for the system-of-record store
//!
//! Records mirror cloud resources under an internal UUID. Relationship edges
//! link EIPs, disks and network interfaces to the CVM they are bound to.

use bridge_traits::extension::{Extension, ExtensionCodec};
use bridge_traits::resource::{
    Attachment, CloudResource, ResourceKind, SyncScope, Vendor, UNASSIGNED_BUSINESS,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::error::{InventoryError, Result};

/// Name of the table holding records of `kind`.
pub fn resource_table(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Eip => "eip",
        ResourceKind::Cvm => "cvm",
        ResourceKind::Disk => "disk",
        ResourceKind::NetworkInterface => "network_interface",
    }
}

pub(crate) fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

// =============================================================================
// Resource Records
// =============================================================================

/// A stored resource of any kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Internal UUID
    pub id: String,
    pub vendor: Vendor,
    pub kind: ResourceKind,
    pub cloud_id: String,
    pub name: Option<String>,
    pub account_id: String,
    pub region: String,
    pub zone: Option<String>,
    pub resource_group: Option<String>,
    pub status: String,
    pub attachment: Option<Attachment>,
    pub business_id: i64,
    pub extension: Extension,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ResourceRecord {
    pub fn is_assigned(&self) -> bool {
        self.business_id != UNASSIGNED_BUSINESS
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ResourceRow {
    pub id: String,
    pub vendor: String,
    pub cloud_id: String,
    pub name: Option<String>,
    pub account_id: String,
    pub region: String,
    pub zone: Option<String>,
    pub resource_group: Option<String>,
    pub status: String,
    pub attachment: Option<String>,
    pub business_id: i64,
    pub extension: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ResourceRow {
    pub(crate) fn into_record(self, kind: ResourceKind) -> Result<ResourceRecord> {
        let vendor = Vendor::from_str(&self.vendor)
            .map_err(|e| InventoryError::invalid("vendor", e))?;

        let attachment = self
            .attachment
            .as_deref()
            .map(serde_json::from_str::<Attachment>)
            .transpose()
            .map_err(|e| InventoryError::invalid("attachment", e.to_string()))?;

        let extension = ExtensionCodec::decode(vendor, kind, &self.extension)?;

        Ok(ResourceRecord {
            id: self.id,
            vendor,
            kind,
            cloud_id: self.cloud_id,
            name: self.name,
            account_id: self.account_id,
            region: self.region,
            zone: self.zone,
            resource_group: self.resource_group,
            status: self.status,
            attachment,
            business_id: self.business_id,
            extension,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn encode_attachment(attachment: &Option<Attachment>) -> Result<Option<String>> {
    attachment
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| InventoryError::invalid("attachment", e.to_string()))
}

/// Input of `batch_create`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResource {
    pub vendor: Vendor,
    pub account_id: String,
    pub business_id: i64,
    pub cloud_id: String,
    pub name: Option<String>,
    pub region: String,
    pub zone: Option<String>,
    pub resource_group: Option<String>,
    pub status: String,
    pub attachment: Option<Attachment>,
    pub extension: Extension,
}

impl NewResource {
    pub fn from_cloud(
        vendor: Vendor,
        account_id: impl Into<String>,
        business_id: i64,
        resource: &CloudResource,
    ) -> Self {
        Self {
            vendor,
            account_id: account_id.into(),
            business_id,
            cloud_id: resource.cloud_id.clone(),
            name: resource.name.clone(),
            region: resource.region.clone(),
            zone: resource.zone.clone(),
            resource_group: resource.resource_group.clone(),
            status: resource.status.clone(),
            attachment: resource.attachment.clone(),
            extension: resource.extension.clone(),
        }
    }
}

/// Input of `batch_update_by_id`. `cloud_id`, vendor and account are immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceUpdate {
    pub id: String,
    pub name: Option<String>,
    pub zone: Option<String>,
    pub resource_group: Option<String>,
    pub status: String,
    pub attachment: Option<Attachment>,
    pub extension: Extension,
}

impl ResourceUpdate {
    pub fn from_cloud(id: impl Into<String>, resource: &CloudResource) -> Self {
        Self {
            id: id.into(),
            name: resource.name.clone(),
            zone: resource.zone.clone(),
            resource_group: resource.resource_group.clone(),
            status: resource.status.clone(),
            attachment: resource.attachment.clone(),
            extension: resource.extension.clone(),
        }
    }
}

/// Conjunctive record filter. Unset fields do not constrain the query.
///
/// An id list that is set but empty matches nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    pub vendor: Option<Vendor>,
    pub account_id: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub resource_group: Option<String>,
    pub cloud_ids: Option<Vec<String>>,
    pub ids: Option<Vec<String>>,
    pub business_id: Option<i64>,
}

impl ResourceFilter {
    /// Records inside a sync scope.
    pub fn from_scope(scope: &SyncScope) -> Self {
        Self {
            vendor: Some(scope.vendor),
            account_id: Some(scope.account_id.clone()),
            region: Some(scope.region.clone()),
            zone: scope.zone.clone(),
            resource_group: scope.resource_group.clone(),
            cloud_ids: scope.cloud_ids.clone(),
            ids: None,
            business_id: None,
        }
    }

    pub fn by_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn with_cloud_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cloud_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_business_id(mut self, business_id: i64) -> Self {
        self.business_id = Some(business_id);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self == &Self::default()
    }

    pub(crate) fn matches_nothing(&self) -> bool {
        matches!(&self.cloud_ids, Some(ids) if ids.is_empty())
            || matches!(&self.ids, Some(ids) if ids.is_empty())
    }
}

// =============================================================================
// Relationship Records
// =============================================================================

/// Edge families. Each links one resource kind to CVM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    EipCvm,
    DiskCvm,
    NetworkInterfaceCvm,
}

impl RelationKind {
    pub const ALL: [RelationKind; 3] = [
        RelationKind::EipCvm,
        RelationKind::DiskCvm,
        RelationKind::NetworkInterfaceCvm,
    ];

    pub fn table(&self) -> &'static str {
        match self {
            RelationKind::EipCvm => "eip_cvm_rel",
            RelationKind::DiskCvm => "disk_cvm_rel",
            RelationKind::NetworkInterfaceCvm => "network_interface_cvm_rel",
        }
    }

    /// Kind of the non-CVM endpoint.
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            RelationKind::EipCvm => ResourceKind::Eip,
            RelationKind::DiskCvm => ResourceKind::Disk,
            RelationKind::NetworkInterfaceCvm => ResourceKind::NetworkInterface,
        }
    }

    /// Edge family whose non-CVM endpoint is `kind`; `None` for CVM.
    pub fn for_resource(kind: ResourceKind) -> Option<Self> {
        match kind {
            ResourceKind::Eip => Some(RelationKind::EipCvm),
            ResourceKind::Disk => Some(RelationKind::DiskCvm),
            ResourceKind::NetworkInterface => Some(RelationKind::NetworkInterfaceCvm),
            ResourceKind::Cvm => None,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub id: i64,
    pub kind: RelationKind,
    pub res_id: String,
    pub cvm_id: String,
    pub creator: String,
    pub created_at: i64,
}

#[derive(Debug, FromRow)]
pub(crate) struct RelationRow {
    pub id: i64,
    pub res_id: String,
    pub cvm_id: String,
    pub creator: String,
    pub created_at: i64,
}

impl RelationRow {
    pub(crate) fn into_record(self, kind: RelationKind) -> RelationRecord {
        RelationRecord {
            id: self.id,
            kind,
            res_id: self.res_id,
            cvm_id: self.cvm_id,
            creator: self.creator,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewRelation {
    pub kind: RelationKind,
    pub res_id: String,
    pub cvm_id: String,
    pub creator: String,
}

impl NewRelation {
    pub fn new(
        kind: RelationKind,
        res_id: impl Into<String>,
        cvm_id: impl Into<String>,
        creator: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            res_id: res_id.into(),
            cvm_id: cvm_id.into(),
            creator: creator.into(),
        }
    }
}

/// Edge filter within one relation family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationFilter {
    pub kind: RelationKind,
    pub ids: Option<Vec<i64>>,
    pub res_ids: Option<Vec<String>>,
    pub cvm_ids: Option<Vec<String>>,
}

impl RelationFilter {
    pub fn new(kind: RelationKind) -> Self {
        Self {
            kind,
            ids: None,
            res_ids: None,
            cvm_ids: None,
        }
    }

    pub fn with_ids(mut self, ids: Vec<i64>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_res_ids(mut self, ids: Vec<String>) -> Self {
        self.res_ids = Some(ids);
        self
    }

    pub fn with_cvm_ids(mut self, ids: Vec<String>) -> Self {
        self.cvm_ids = Some(ids);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.ids.is_none() && self.res_ids.is_none() && self.cvm_ids.is_none()
    }

    pub(crate) fn matches_nothing(&self) -> bool {
        matches!(&self.ids, Some(ids) if ids.is_empty())
            || matches!(&self.res_ids, Some(ids) if ids.is_empty())
            || matches!(&self.cvm_ids, Some(ids) if ids.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::extension::TCloudEipExtension;

    #[test]
    fn test_filter_from_scope() {
        let scope = SyncScope::new(Vendor::Azure, "sub-1", "eastus")
            .with_resource_group("rg-1")
            .with_cloud_ids(["a", "b"]);

        let filter = ResourceFilter::from_scope(&scope);
        assert_eq!(filter.vendor, Some(Vendor::Azure));
        assert_eq!(filter.resource_group.as_deref(), Some("rg-1"));
        assert_eq!(filter.cloud_ids.as_ref().map(Vec::len), Some(2));
        assert!(!filter.is_unbounded());
    }

    #[test]
    fn test_empty_id_list_matches_nothing() {
        assert!(ResourceFilter::by_ids(Vec::<String>::new()).matches_nothing());
        assert!(!ResourceFilter::default().matches_nothing());
        assert!(RelationFilter::new(RelationKind::DiskCvm)
            .with_res_ids(Vec::new())
            .matches_nothing());
    }

    #[test]
    fn test_relation_kind_mapping() {
        for kind in RelationKind::ALL {
            assert_eq!(RelationKind::for_resource(kind.resource_kind()), Some(kind));
        }
        assert_eq!(RelationKind::for_resource(ResourceKind::Cvm), None);
        assert_eq!(RelationKind::EipCvm.to_string(), "eip_cvm_rel");
    }

    #[test]
    fn test_row_into_record() {
        let row = ResourceRow {
            id: "id-1".into(),
            vendor: "tcloud".into(),
            cloud_id: "eip-1".into(),
            name: None,
            account_id: "acct".into(),
            region: "ap-guangzhou".into(),
            zone: None,
            resource_group: None,
            status: "BIND".into(),
            attachment: Some(r#"{"kind":"cvm","reference":{"by":"cloud_id","value":"ins-1"}}"#.into()),
            business_id: -1,
            extension: ExtensionCodec::encode(&Extension::TCloudEip(TCloudEipExtension::default()))
                .unwrap(),
            created_at: 1,
            updated_at: 1,
        };

        let record = row.into_record(ResourceKind::Eip).unwrap();
        assert_eq!(record.attachment, Some(Attachment::instance("ins-1")));
        assert!(!record.is_assigned());
    }

    #[test]
    fn test_row_with_foreign_schema_is_rejected() {
        let row = ResourceRow {
            id: "id-1".into(),
            vendor: "aws".into(),
            cloud_id: "eipalloc-1".into(),
            name: None,
            account_id: "acct".into(),
            region: "us-east-1".into(),
            zone: None,
            resource_group: None,
            status: "BIND".into(),
            attachment: None,
            business_id: -1,
            extension: ExtensionCodec::encode(&Extension::TCloudEip(TCloudEipExtension::default()))
                .unwrap(),
            created_at: 1,
            updated_at: 1,
        };

        assert!(row.into_record(ResourceKind::Eip).is_err());
    }
}
