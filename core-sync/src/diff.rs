//! # Diff Engine
//!
//! Partitions a cloud snapshot and the stored records of the same scope into
//! create, update, delete and unchanged sets.
//!
//! Every cloud id of `cloud ∪ stored` lands in exactly one partition. The
//! engine is pure: it performs no I/O and never mutates its inputs.

use std::collections::{BTreeMap, BTreeSet};

use bridge_traits::resource::CloudResource;
use core_inventory::ResourceRecord;

/// Cloud listing of one pass, keyed by cloud id.
pub type CloudSnapshot = BTreeMap<String, CloudResource>;

/// Decides whether a stored record needs to be rewritten from the cloud.
pub trait ChangePredicate: Send + Sync {
    fn changed(&self, cloud: &CloudResource, stored: &ResourceRecord) -> bool;
}

/// Default predicate: only the vendor status is compared.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusChanged;

impl ChangePredicate for StatusChanged {
    fn changed(&self, cloud: &CloudResource, stored: &ResourceRecord) -> bool {
        cloud.status != stored.status
    }
}

/// Compares every field the store keeps for a record.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldsChanged;

impl ChangePredicate for FieldsChanged {
    fn changed(&self, cloud: &CloudResource, stored: &ResourceRecord) -> bool {
        cloud.status != stored.status
            || cloud.name != stored.name
            || cloud.zone != stored.zone
            || cloud.resource_group != stored.resource_group
            || cloud.attachment != stored.attachment
            || cloud.extension != stored.extension
    }
}

/// An update addressed by internal id.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate {
    pub id: String,
    pub resource: CloudResource,
}

/// Result of a diff, keyed by cloud id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub to_create: BTreeMap<String, CloudResource>,
    pub to_update: BTreeMap<String, PlannedUpdate>,
    /// cloud id -> internal id
    pub to_delete: BTreeMap<String, String>,
    pub unchanged: BTreeSet<String>,
}

impl SyncPlan {
    pub fn has_mutations(&self) -> bool {
        !(self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty())
    }

    /// Number of cloud ids across all partitions.
    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.to_delete.len() + self.unchanged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition `cloud` against `stored`.
///
/// `cloud` must be a complete snapshot of the scope `stored` was loaded for.
pub fn diff(
    cloud: &CloudSnapshot,
    stored: &[ResourceRecord],
    predicate: &dyn ChangePredicate,
) -> SyncPlan {
    let stored: BTreeMap<&str, &ResourceRecord> =
        stored.iter().map(|r| (r.cloud_id.as_str(), r)).collect();

    let mut plan = SyncPlan::default();

    for (cloud_id, resource) in cloud {
        match stored.get(cloud_id.as_str()) {
            None => {
                plan.to_create.insert(cloud_id.clone(), resource.clone());
            }
            Some(record) if predicate.changed(resource, record) => {
                plan.to_update.insert(
                    cloud_id.clone(),
                    PlannedUpdate {
                        id: record.id.clone(),
                        resource: resource.clone(),
                    },
                );
            }
            Some(_) => {
                plan.unchanged.insert(cloud_id.clone());
            }
        }
    }

    for (cloud_id, record) in stored {
        if !cloud.contains_key(cloud_id) {
            plan.to_delete.insert(cloud_id.to_string(), record.id.clone());
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::extension::{Extension, TCloudEipExtension};
    use bridge_traits::resource::{Attachment, ResourceKind, Vendor};

    fn cloud(cloud_id: &str, status: &str) -> CloudResource {
        CloudResource::new(
            cloud_id,
            status,
            "ap-guangzhou",
            Extension::TCloudEip(TCloudEipExtension::default()),
        )
    }

    fn stored(cloud_id: &str, status: &str) -> ResourceRecord {
        ResourceRecord {
            id: format!("id-{}", cloud_id),
            vendor: Vendor::TCloud,
            kind: ResourceKind::Eip,
            cloud_id: cloud_id.to_string(),
            name: None,
            account_id: "acct-1".into(),
            region: "ap-guangzhou".into(),
            zone: None,
            resource_group: None,
            status: status.to_string(),
            attachment: None,
            business_id: -1,
            extension: Extension::TCloudEip(TCloudEipExtension::default()),
            created_at: 0,
            updated_at: 0,
        }
    }

    fn snapshot(items: Vec<CloudResource>) -> CloudSnapshot {
        items.into_iter().map(|r| (r.cloud_id.clone(), r)).collect()
    }

    #[test]
    fn test_partitions() {
        let cloud = snapshot(vec![cloud("a", "BIND"), cloud("b", "UNBIND"), cloud("c", "BIND")]);
        let stored = vec![stored("b", "BIND"), stored("c", "BIND"), stored("d", "BIND")];

        let plan = diff(&cloud, &stored, &StatusChanged);

        assert_eq!(plan.to_create.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(plan.to_update["b"].id, "id-b");
        assert_eq!(plan.to_update["b"].resource.status, "UNBIND");
        assert!(plan.unchanged.contains("c"));
        assert_eq!(plan.to_delete.get("d").map(String::as_str), Some("id-d"));
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_every_id_lands_in_one_partition() {
        let cloud = snapshot((0..40).map(|i| cloud(&format!("r-{i}"), if i % 3 == 0 { "A" } else { "B" })).collect());
        let stored: Vec<_> = (20..60).map(|i| stored(&format!("r-{i}"), "B")).collect();

        let plan = diff(&cloud, &stored, &StatusChanged);

        let mut seen = BTreeSet::new();
        let partitions = plan
            .to_create
            .keys()
            .chain(plan.to_update.keys())
            .chain(plan.to_delete.keys())
            .chain(plan.unchanged.iter());
        for id in partitions {
            assert!(seen.insert(id.clone()), "{} appears twice", id);
        }

        let universe: BTreeSet<String> = cloud
            .keys()
            .cloned()
            .chain(stored.iter().map(|r| r.cloud_id.clone()))
            .collect();
        assert_eq!(seen, universe);
    }

    #[test]
    fn test_empty_inputs() {
        let plan = diff(&CloudSnapshot::new(), &[], &StatusChanged);
        assert!(plan.is_empty());
        assert!(!plan.has_mutations());
    }

    #[test]
    fn test_status_only_ignores_other_fields() {
        let cloud = snapshot(vec![cloud("a", "BIND").with_attachment(Some(Attachment::instance("ins-9")))]);
        let stored = vec![stored("a", "BIND")];

        assert!(diff(&cloud, &stored, &StatusChanged).unchanged.contains("a"));
        assert!(diff(&cloud, &stored, &FieldsChanged).to_update.contains_key("a"));
    }
}
