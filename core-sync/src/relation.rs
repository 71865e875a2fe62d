//! # Relationship Propagator
//!
//! Re-derives `(resource, cvm)` edges from what the vendor reports.
//!
//! Two directions are supported:
//! - from resources: an EIP, disk or network interface names the instance it
//!   is attached to (`CloudResource::attachment`)
//! - from instances: a CVM lists the disks and interfaces it owns
//!   (`CloudResource::related`)
//!
//! In both cases the desired edge set is compared with the stored one for the
//! same endpoints. Missing edges are created and extra edges deleted; edges
//! are never updated in place.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use bridge_traits::resource::{Attachment, CloudResource, ResourceKind, ResourceRef, Vendor};
use core_inventory::repositories::delete_in_chunks;
use core_inventory::{
    InventoryError, NewRelation, RelationFilter, RelationKind, RelationRecord, RelationStore,
    ResourceStore,
};
use core_runtime::events::{CoreEvent, EventBus, RelationEvent};
use tracing::{debug, info, instrument};

use crate::{Result, SyncError};

/// Creator recorded on edges written by the engine.
pub const EDGE_CREATOR: &str = "hcm-sync";

const EDGE_QUERY_CHUNK: usize = 500;

/// Relation families a vendor supports, by non-CVM kind.
pub fn relation_kinds(vendor: Vendor) -> &'static [ResourceKind] {
    match vendor {
        Vendor::TCloud | Vendor::Aws => &[ResourceKind::Disk, ResourceKind::Eip],
        Vendor::Gcp | Vendor::Azure | Vendor::HuaWei => &[
            ResourceKind::Disk,
            ResourceKind::Eip,
            ResourceKind::NetworkInterface,
        ],
    }
}

/// Kinds a vendor's instance listing reports as `related`.
///
/// EIP edges are always derived from the EIP side.
pub fn instance_reported_kinds(vendor: Vendor) -> &'static [ResourceKind] {
    match vendor {
        Vendor::TCloud | Vendor::Aws => &[ResourceKind::Disk],
        Vendor::Gcp | Vendor::Azure | Vendor::HuaWei => {
            &[ResourceKind::Disk, ResourceKind::NetworkInterface]
        }
    }
}

/// Relation family of `(vendor, kind)`.
///
/// # Errors
///
/// Returns `UnsupportedRelation` for CVM and for pairs outside the vendor matrix.
pub fn relation_for(vendor: Vendor, kind: ResourceKind) -> Result<RelationKind> {
    match RelationKind::for_resource(kind) {
        Some(relation) if relation_kinds(vendor).contains(&kind) => Ok(relation),
        _ => Err(SyncError::UnsupportedRelation { vendor, kind }),
    }
}

/// Edges created and deleted by one reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeDelta {
    pub created: u64,
    pub deleted: u64,
}

type Edge = (String, String);

pub struct RelationPropagator {
    resources: Arc<dyn ResourceStore>,
    relations: Arc<dyn RelationStore>,
    event_bus: EventBus,
}

impl RelationPropagator {
    pub fn new(
        resources: Arc<dyn ResourceStore>,
        relations: Arc<dyn RelationStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            resources,
            relations,
            event_bus,
        }
    }

    /// Reconcile edges of synced EIPs, disks or network interfaces from their
    /// attachments.
    #[instrument(skip(self, resources), fields(vendor = %vendor, kind = %kind, count = resources.len()))]
    pub async fn reconcile_from_resources(
        &self,
        vendor: Vendor,
        account_id: &str,
        kind: ResourceKind,
        resources: &[CloudResource],
    ) -> Result<EdgeDelta> {
        let relation = relation_for(vendor, kind)?;

        let refs: Vec<ResourceRef> = resources
            .iter()
            .map(|r| ResourceRef::CloudId(r.cloud_id.clone()))
            .collect();
        let res_ids = self.resolve(vendor, kind, account_id, refs).await?;

        let attached: Vec<(String, &Attachment)> = resources
            .iter()
            .filter_map(|r| {
                let res_id = res_ids.get(&ResourceRef::CloudId(r.cloud_id.clone()))?;
                Some((res_id.clone(), r.attachment.as_ref()?))
            })
            .collect();
        let desired = self.resolve_attachments(vendor, account_id, attached).await?;

        let synced: Vec<String> = res_ids.into_values().collect();
        let mut existing = Vec::new();
        for chunk in synced.chunks(EDGE_QUERY_CHUNK) {
            let filter = RelationFilter::new(relation).with_res_ids(chunk.to_vec());
            existing.extend(self.relations.list(&filter).await?);
        }

        self.apply(vendor, relation, desired, existing).await
    }

    /// Reconcile `kind` edges of synced CVMs from what each instance reports.
    #[instrument(skip(self, cvms), fields(vendor = %vendor, kind = %kind, count = cvms.len()))]
    pub async fn reconcile_from_instances(
        &self,
        vendor: Vendor,
        account_id: &str,
        kind: ResourceKind,
        cvms: &[CloudResource],
    ) -> Result<EdgeDelta> {
        let relation = relation_for(vendor, kind)?;

        let cvm_refs = cvms
            .iter()
            .map(|c| ResourceRef::CloudId(c.cloud_id.clone()))
            .collect();
        let cvm_ids = self
            .resolve(vendor, ResourceKind::Cvm, account_id, cvm_refs)
            .await?;

        let related: Vec<ResourceRef> = cvms
            .iter()
            .flat_map(|c| c.related_of(kind).cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let res_ids = self.resolve(vendor, kind, account_id, related).await?;

        let mut desired = BTreeSet::new();
        for cvm in cvms {
            let Some(cvm_id) = cvm_ids.get(&ResourceRef::CloudId(cvm.cloud_id.clone())) else {
                continue;
            };
            for reference in cvm.related_of(kind) {
                if let Some(res_id) = res_ids.get(reference) {
                    desired.insert((res_id.clone(), cvm_id.clone()));
                }
            }
        }

        let synced: Vec<String> = cvm_ids.into_values().collect();
        let mut existing = Vec::new();
        for chunk in synced.chunks(EDGE_QUERY_CHUNK) {
            let filter = RelationFilter::new(relation).with_cvm_ids(chunk.to_vec());
            existing.extend(self.relations.list(&filter).await?);
        }

        self.apply(vendor, relation, desired, existing).await
    }

    /// Create one edge between stored records.
    ///
    /// # Errors
    ///
    /// Returns `RelationEndpointMissing` if either record does not exist.
    pub async fn link(&self, relation: RelationKind, res_id: &str, cvm_id: &str) -> Result<bool> {
        let created = self
            .relations
            .create(vec![NewRelation::new(relation, res_id, cvm_id, EDGE_CREATOR)])
            .await
            .map_err(endpoint_error)?;
        Ok(created > 0)
    }

    /// Remove one edge. Returns the number of edges removed.
    pub async fn unlink(&self, relation: RelationKind, res_id: &str, cvm_id: &str) -> Result<u64> {
        let filter = RelationFilter::new(relation)
            .with_res_ids(vec![res_id.to_string()])
            .with_cvm_ids(vec![cvm_id.to_string()]);
        Ok(self.relations.delete(&filter).await?)
    }

    /// Edges currently linked to CVMs, by relation family.
    pub async fn edges_of_instances(
        &self,
        relation: RelationKind,
        cvm_ids: &[String],
    ) -> Result<Vec<RelationRecord>> {
        let mut edges = Vec::new();
        for chunk in cvm_ids.chunks(EDGE_QUERY_CHUNK) {
            let filter = RelationFilter::new(relation).with_cvm_ids(chunk.to_vec());
            edges.extend(self.relations.list(&filter).await?);
        }
        Ok(edges)
    }

    async fn resolve(
        &self,
        vendor: Vendor,
        kind: ResourceKind,
        account_id: &str,
        refs: Vec<ResourceRef>,
    ) -> Result<HashMap<ResourceRef, String>> {
        if refs.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .resources
            .resolve_refs(vendor, kind, account_id, &refs)
            .await?)
    }

    /// Map `(res_id, attachment)` pairs to `(res_id, cvm_id)` edges.
    ///
    /// Attachments to a network interface follow the interface's stored
    /// edge to its instance. The record's attachment column is not used
    /// since an unchanged record is never rewritten.
    async fn resolve_attachments(
        &self,
        vendor: Vendor,
        account_id: &str,
        attached: Vec<(String, &Attachment)>,
    ) -> Result<BTreeSet<Edge>> {
        let mut via_instance: Vec<(String, ResourceRef)> = Vec::new();
        let mut via_interface: Vec<(String, ResourceRef)> = Vec::new();
        for (res_id, attachment) in attached {
            match attachment.kind {
                ResourceKind::Cvm => via_instance.push((res_id, attachment.reference.clone())),
                ResourceKind::NetworkInterface => {
                    via_interface.push((res_id, attachment.reference.clone()))
                }
                other => debug!(kind = %other, "Ignoring attachment to non-instance resource"),
            }
        }

        let mut edges = BTreeSet::new();
        if !via_interface.is_empty() {
            let nic_refs = via_interface.iter().map(|(_, r)| r.clone()).collect();
            let nic_ids = self
                .resolve(vendor, ResourceKind::NetworkInterface, account_id, nic_refs)
                .await?;

            let ids: Vec<String> = nic_ids.values().cloned().collect();
            let mut owners: HashMap<String, String> = HashMap::new();
            for chunk in ids.chunks(EDGE_QUERY_CHUNK) {
                let filter = RelationFilter::new(RelationKind::NetworkInterfaceCvm)
                    .with_res_ids(chunk.to_vec());
                for edge in self.relations.list(&filter).await? {
                    owners.insert(edge.res_id, edge.cvm_id);
                }
            }

            for (res_id, nic_ref) in via_interface {
                match nic_ids.get(&nic_ref).and_then(|id| owners.get(id)) {
                    Some(cvm_id) => {
                        edges.insert((res_id, cvm_id.clone()));
                    }
                    None => debug!(nic = %nic_ref.value(), "Network interface not linked to an instance"),
                }
            }
        }

        let cvm_refs = via_instance
            .iter()
            .map(|(_, r)| r.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let cvm_ids = self
            .resolve(vendor, ResourceKind::Cvm, account_id, cvm_refs)
            .await?;

        edges.extend(via_instance.into_iter().filter_map(|(res_id, reference)| {
            cvm_ids.get(&reference).map(|cvm_id| (res_id, cvm_id.clone()))
        }));
        Ok(edges)
    }

    async fn apply(
        &self,
        vendor: Vendor,
        relation: RelationKind,
        desired: BTreeSet<Edge>,
        existing: Vec<RelationRecord>,
    ) -> Result<EdgeDelta> {
        let existing: BTreeMap<Edge, i64> = existing
            .into_iter()
            .map(|e| ((e.res_id, e.cvm_id), e.id))
            .collect();

        let to_create: Vec<NewRelation> = desired
            .iter()
            .filter(|edge| !existing.contains_key(*edge))
            .map(|(res_id, cvm_id)| NewRelation::new(relation, res_id, cvm_id, EDGE_CREATOR))
            .collect();
        let to_delete: Vec<i64> = existing
            .iter()
            .filter(|(edge, _)| !desired.contains(*edge))
            .map(|(_, id)| *id)
            .collect();

        let mut delta = EdgeDelta::default();
        if !to_create.is_empty() {
            delta.created = self.relations.create(to_create).await.map_err(endpoint_error)?;
        }
        if !to_delete.is_empty() {
            delta.deleted = delete_in_chunks(self.relations.as_ref(), relation, &to_delete).await?;
        }

        info!(
            created = delta.created,
            deleted = delta.deleted,
            "[{}] reconcile {} success",
            vendor,
            relation
        );
        self.event_bus
            .emit(CoreEvent::Relation(RelationEvent::EdgesReconciled {
                vendor: vendor.to_string(),
                relation: relation.to_string(),
                created: delta.created,
                deleted: delta.deleted,
            }))
            .ok();

        Ok(delta)
    }
}

fn endpoint_error(e: InventoryError) -> SyncError {
    match e {
        InventoryError::EndpointMissing { table, id } => {
            SyncError::RelationEndpointMissing(format!("{} {}", table, id))
        }
        other => SyncError::Inventory(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::extension::{
        AzureEipExtension, AzureNetworkInterfaceExtension, Extension, TCloudCvmExtension,
        TCloudDiskExtension, TCloudEipExtension, AzureCvmExtension,
    };
    use bridge_traits::resource::UNASSIGNED_BUSINESS;
    use core_inventory::db::create_test_pool;
    use core_inventory::{NewResource, SqliteRelationStore, SqliteResourceStore};

    struct Fixture {
        resources: Arc<SqliteResourceStore>,
        relations: Arc<SqliteRelationStore>,
        propagator: RelationPropagator,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        let resources = Arc::new(SqliteResourceStore::new(pool.clone()));
        let relations = Arc::new(SqliteRelationStore::new(pool));
        let propagator =
            RelationPropagator::new(resources.clone(), relations.clone(), EventBus::new(16));
        Fixture {
            resources,
            relations,
            propagator,
        }
    }

    async fn store(f: &Fixture, vendor: Vendor, kind: ResourceKind, items: &[CloudResource]) -> Vec<String> {
        let items = items
            .iter()
            .map(|r| NewResource::from_cloud(vendor, "acct-1", UNASSIGNED_BUSINESS, r))
            .collect();
        f.resources.batch_create(kind, items).await.unwrap()
    }

    fn tcloud_cvm(id: &str) -> CloudResource {
        CloudResource::new(id, "RUNNING", "ap-guangzhou", Extension::TCloudCvm(TCloudCvmExtension::default()))
    }

    fn tcloud_eip(id: &str, instance: Option<&str>) -> CloudResource {
        CloudResource::new(id, "BIND", "ap-guangzhou", Extension::TCloudEip(TCloudEipExtension::default()))
            .with_attachment(instance.map(Attachment::instance))
    }

    #[test]
    fn test_relation_matrix() {
        assert!(relation_for(Vendor::TCloud, ResourceKind::Eip).is_ok());
        assert!(relation_for(Vendor::Aws, ResourceKind::Disk).is_ok());
        assert!(matches!(
            relation_for(Vendor::Aws, ResourceKind::NetworkInterface),
            Err(SyncError::UnsupportedRelation { .. })
        ));
        assert!(relation_for(Vendor::HuaWei, ResourceKind::NetworkInterface).is_ok());
        assert!(relation_for(Vendor::Gcp, ResourceKind::Cvm).is_err());
    }

    #[tokio::test]
    async fn test_edges_follow_attachments() {
        let f = setup().await;
        let cvm_ids = store(&f, Vendor::TCloud, ResourceKind::Cvm, &[tcloud_cvm("ins-1")]).await;
        let eips = vec![tcloud_eip("eip-1", Some("ins-1")), tcloud_eip("eip-2", None)];
        let eip_ids = store(&f, Vendor::TCloud, ResourceKind::Eip, &eips).await;

        let delta = f
            .propagator
            .reconcile_from_resources(Vendor::TCloud, "acct-1", ResourceKind::Eip, &eips)
            .await
            .unwrap();
        assert_eq!(delta, EdgeDelta { created: 1, deleted: 0 });

        let edges = f
            .relations
            .list_by_endpoint(ResourceKind::Eip, &eip_ids[0])
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].cvm_id, cvm_ids[0]);

        // unbinding removes the edge, and a repeat pass is a no-op
        let unbound = vec![tcloud_eip("eip-1", None), tcloud_eip("eip-2", None)];
        let delta = f
            .propagator
            .reconcile_from_resources(Vendor::TCloud, "acct-1", ResourceKind::Eip, &unbound)
            .await
            .unwrap();
        assert_eq!(delta, EdgeDelta { created: 0, deleted: 1 });

        let delta = f
            .propagator
            .reconcile_from_resources(Vendor::TCloud, "acct-1", ResourceKind::Eip, &unbound)
            .await
            .unwrap();
        assert_eq!(delta, EdgeDelta::default());
    }

    fn azure_vm(id: &str) -> CloudResource {
        CloudResource::new(id, "PowerState/running", "eastus", Extension::AzureCvm(AzureCvmExtension::default()))
    }

    fn azure_nic(id: &str, vm: &str) -> CloudResource {
        CloudResource::new(id, "Succeeded", "eastus", Extension::AzureNetworkInterface(AzureNetworkInterfaceExtension::default()))
            .with_attachment(Some(Attachment::instance(vm)))
    }

    fn azure_pip(id: &str, nic: &str) -> CloudResource {
        CloudResource::new(id, "BIND", "eastus", Extension::AzureEip(AzureEipExtension::default()))
            .with_attachment(Some(Attachment::network_interface(nic)))
    }

    #[tokio::test]
    async fn test_attachment_through_network_interface() {
        let f = setup().await;
        let cvm_ids = store(&f, Vendor::Azure, ResourceKind::Cvm, &[azure_vm("vm-1")]).await;
        let nic = azure_nic("nic-1", "vm-1");
        store(&f, Vendor::Azure, ResourceKind::NetworkInterface, &[nic.clone()]).await;
        let eip = azure_pip("pip-1", "nic-1");
        let eip_ids = store(&f, Vendor::Azure, ResourceKind::Eip, &[eip.clone()]).await;

        // no interface edge yet, so the eip cannot be placed
        let delta = f
            .propagator
            .reconcile_from_resources(Vendor::Azure, "acct-1", ResourceKind::Eip, &[eip.clone()])
            .await
            .unwrap();
        assert_eq!(delta, EdgeDelta::default());

        f.propagator
            .reconcile_from_resources(Vendor::Azure, "acct-1", ResourceKind::NetworkInterface, &[nic])
            .await
            .unwrap();
        let delta = f
            .propagator
            .reconcile_from_resources(Vendor::Azure, "acct-1", ResourceKind::Eip, &[eip])
            .await
            .unwrap();
        assert_eq!(delta.created, 1);

        let edges = f
            .relations
            .list(&RelationFilter::new(RelationKind::EipCvm).with_cvm_ids(cvm_ids.clone()))
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].res_id, eip_ids[0]);
    }

    #[tokio::test]
    async fn test_eip_follows_interface_moved_without_status_change() {
        let f = setup().await;
        let cvm_ids = store(&f, Vendor::Azure, ResourceKind::Cvm, &[azure_vm("vm-1"), azure_vm("vm-2")]).await;
        // the stored record keeps saying vm-1
        store(&f, Vendor::Azure, ResourceKind::NetworkInterface, &[azure_nic("nic-1", "vm-1")]).await;
        let eip = azure_pip("pip-1", "nic-1");
        let eip_ids = store(&f, Vendor::Azure, ResourceKind::Eip, &[eip.clone()]).await;

        f.propagator
            .reconcile_from_resources(Vendor::Azure, "acct-1", ResourceKind::NetworkInterface, &[azure_nic("nic-1", "vm-1")])
            .await
            .unwrap();
        f.propagator
            .reconcile_from_resources(Vendor::Azure, "acct-1", ResourceKind::Eip, &[eip.clone()])
            .await
            .unwrap();

        // a later interface pass sees it on vm-2
        f.propagator
            .reconcile_from_resources(Vendor::Azure, "acct-1", ResourceKind::NetworkInterface, &[azure_nic("nic-1", "vm-2")])
            .await
            .unwrap();
        let delta = f
            .propagator
            .reconcile_from_resources(Vendor::Azure, "acct-1", ResourceKind::Eip, &[eip])
            .await
            .unwrap();
        assert_eq!(delta, EdgeDelta { created: 1, deleted: 1 });

        let edges = f
            .relations
            .list(&RelationFilter::new(RelationKind::EipCvm).with_res_ids(eip_ids))
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].cvm_id, cvm_ids[1]);
    }

    #[tokio::test]
    async fn test_edges_from_instances() {
        let f = setup().await;
        let disks: Vec<_> = ["disk-1", "disk-2"]
            .iter()
            .map(|id| CloudResource::new(*id, "ATTACHED", "ap-guangzhou", Extension::TCloudDisk(TCloudDiskExtension::default())))
            .collect();
        let disk_ids = store(&f, Vendor::TCloud, ResourceKind::Disk, &disks).await;

        let cvm = tcloud_cvm("ins-1")
            .with_related(ResourceKind::Disk, ResourceRef::CloudId("disk-1".into()))
            .with_related(ResourceKind::Disk, ResourceRef::CloudId("disk-2".into()));
        store(&f, Vendor::TCloud, ResourceKind::Cvm, &[cvm.clone()]).await;

        let delta = f
            .propagator
            .reconcile_from_instances(Vendor::TCloud, "acct-1", ResourceKind::Disk, &[cvm])
            .await
            .unwrap();
        assert_eq!(delta.created, 2);

        let detached = tcloud_cvm("ins-1")
            .with_related(ResourceKind::Disk, ResourceRef::CloudId("disk-2".into()));
        let delta = f
            .propagator
            .reconcile_from_instances(Vendor::TCloud, "acct-1", ResourceKind::Disk, &[detached])
            .await
            .unwrap();
        assert_eq!(delta, EdgeDelta { created: 0, deleted: 1 });

        let remaining = f
            .relations
            .list_by_endpoint(ResourceKind::Disk, &disk_ids[1])
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_link_requires_both_endpoints() {
        let f = setup().await;
        let cvm_ids = store(&f, Vendor::TCloud, ResourceKind::Cvm, &[tcloud_cvm("ins-1")]).await;

        let result = f.propagator.link(RelationKind::EipCvm, "ghost", &cvm_ids[0]).await;
        assert!(matches!(result, Err(SyncError::RelationEndpointMissing(_))));
    }
}
