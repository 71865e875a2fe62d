//! # CVM Cascade
//!
//! Syncs instances together with the disks, EIPs and network interfaces
//! bound to them, and drives EIP association changes.
//!
//! A cascade over a scope:
//! 1. fetches the CVM snapshot once; an empty snapshot falls back to a plain
//!    CVM pass over it
//! 2. collects the related cloud ids per kind, from what the instances report
//!    and from the edges already stored for them
//! 3. runs scoped passes for disks, EIPs, CVMs and network interfaces, in
//!    that order, at most `cloud_id_chunk_size` ids per pass; the CVM pass
//!    reuses the snapshot of step 1
//! 4. reconciles the instance-side edges for the kinds instances report, then
//!    re-derives the edges of EIPs bound through a network interface, since
//!    the interface pass runs after theirs
//!
//! Association changes are applied on the vendor first. The stored edge is
//! then updated optimistically and both sides re-synced; the re-sync decides
//! the final state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bridge_traits::resource::{CloudResource, ResourceKind, ResourceRef, SyncScope};
use bridge_traits::vendor::EipAssociation;
use core_inventory::repositories::{PageRequest, MAX_PAGE_SIZE};
use core_inventory::{RelationKind, ResourceFilter};
use tracing::{debug, info, instrument, warn};

use crate::diff::CloudSnapshot;
use crate::orchestrator::{SyncOptions, SyncOrchestrator, SyncReport};
use crate::relation::{instance_reported_kinds, relation_for, relation_kinds, EdgeDelta};
use crate::{Result, SyncError, SyncStats};

/// Kinds synced around the CVM pass, in order. CVM itself runs between EIP
/// and network interface.
const BEFORE_CVM: [ResourceKind; 2] = [ResourceKind::Disk, ResourceKind::Eip];
const AFTER_CVM: [ResourceKind; 1] = [ResourceKind::NetworkInterface];

/// Passes run by one cascade and the edge changes made after them.
#[derive(Debug, Clone, Default)]
pub struct CascadeReport {
    pub passes: Vec<SyncReport>,
    pub edges: BTreeMap<ResourceKind, EdgeDelta>,
}

impl CascadeReport {
    /// Summed counters of every pass over `kind`.
    pub fn stats_of(&self, kind: ResourceKind) -> SyncStats {
        self.passes
            .iter()
            .filter(|p| p.kind == kind)
            .fold(SyncStats::default(), |mut acc, p| {
                acc.fetched += p.stats.fetched;
                acc.created += p.stats.created;
                acc.updated += p.stats.updated;
                acc.deleted += p.stats.deleted;
                acc.unchanged += p.stats.unchanged;
                acc
            })
    }

    fn merge(&mut self, other: CascadeReport) {
        self.passes.extend(other.passes);
        for (kind, delta) in other.edges {
            self.add_edges(kind, delta);
        }
    }

    fn add_edges(&mut self, kind: ResourceKind, delta: EdgeDelta) {
        let entry = self.edges.entry(kind).or_default();
        entry.created += delta.created;
        entry.deleted += delta.deleted;
    }
}

pub struct CvmCascade {
    orchestrator: Arc<SyncOrchestrator>,
}

impl CvmCascade {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Sync the CVMs of `scope` with their related resources.
    #[instrument(
        skip(self, scope, options),
        fields(vendor = %scope.vendor, account_id = %scope.account_id, region = %scope.region)
    )]
    pub async fn sync_with_related(
        &self,
        scope: &SyncScope,
        options: &SyncOptions,
    ) -> Result<CascadeReport> {
        let vendor = scope.vendor;
        let mut report = CascadeReport::default();

        let cvms = self
            .orchestrator
            .fetch_snapshot(ResourceKind::Cvm, scope, &options.cancel)
            .await?;
        if cvms.is_empty() {
            debug!("[{}] no cvm in scope, running plain cvm sync", vendor);
            report.passes.push(
                self.orchestrator
                    .sync_snapshot(ResourceKind::Cvm, scope, cvms, options)
                    .await?,
            );
            return Ok(report);
        }

        let cvm_ids = self.stored_cvm_ids(scope, &cvms).await?;
        let mut related = BTreeMap::new();
        for &kind in relation_kinds(vendor) {
            if self.orchestrator.registry().resolve(vendor, kind).is_err() {
                debug!("[{}] no {} client registered, skipping", vendor, kind);
                continue;
            }
            let ids = self.related_cloud_ids(scope, kind, &cvms, &cvm_ids).await?;
            related.insert(kind, ids);
        }

        let mut eips = Vec::new();
        for kind in BEFORE_CVM {
            if let Some(ids) = related.get(&kind) {
                let synced = self.sync_scoped(kind, scope, ids, options, &mut report).await?;
                if kind == ResourceKind::Eip {
                    eips = synced;
                }
            }
        }
        let deferred = options.clone().deferring_instance_relations();
        report.passes.push(
            self.orchestrator
                .sync_snapshot(ResourceKind::Cvm, scope, cvms.clone(), &deferred)
                .await?,
        );
        for kind in AFTER_CVM {
            if let Some(ids) = related.get(&kind) {
                self.sync_scoped(kind, scope, ids, options, &mut report).await?;
            }
        }

        if self.orchestrator.settings().propagate_relations {
            let propagator = self.orchestrator.propagator();
            let instances: Vec<_> = cvms.into_values().collect();
            for &kind in instance_reported_kinds(vendor) {
                match propagator
                    .reconcile_from_instances(vendor, &scope.account_id, kind, &instances)
                    .await
                {
                    Ok(delta) => report.add_edges(kind, delta),
                    Err(e) => {
                        warn!(error = %e, "[{}] reconcile cvm {} relations failed", vendor, kind)
                    }
                }
            }

            let through_interface: Vec<CloudResource> = eips
                .into_iter()
                .filter(|e| {
                    matches!(&e.attachment, Some(a) if a.kind == ResourceKind::NetworkInterface)
                })
                .collect();
            if !through_interface.is_empty() {
                match propagator
                    .reconcile_from_resources(
                        vendor,
                        &scope.account_id,
                        ResourceKind::Eip,
                        &through_interface,
                    )
                    .await
                {
                    Ok(delta) => report.add_edges(ResourceKind::Eip, delta),
                    Err(e) => warn!(error = %e, "[{}] reconcile eip relations failed", vendor),
                }
            }
        }

        info!(
            account_id = %scope.account_id,
            passes = report.passes.len(),
            "[{}] sync cvm with related resources success",
            vendor
        );
        Ok(report)
    }

    /// Bind an EIP on the vendor, then re-sync both sides.
    #[instrument(
        skip(self, scope, request, options),
        fields(vendor = %scope.vendor, eip = %request.eip_cloud_id, cvm = %request.cvm_cloud_id)
    )]
    pub async fn associate_eip(
        &self,
        scope: &SyncScope,
        request: &EipAssociation,
        options: &SyncOptions,
    ) -> Result<CascadeReport> {
        let scope = scope.unfiltered();
        scope
            .validate()
            .map_err(|e| SyncError::InvalidScope(e.to_string()))?;
        let client = self.orchestrator.registry().association(scope.vendor)?;

        self.orchestrator
            .call_vendor(&options.cancel, client.associate(&scope, request))
            .await?;
        info!(
            account_id = %scope.account_id,
            "[{}] associate eip {} to cvm {} success",
            scope.vendor,
            request.eip_cloud_id,
            request.cvm_cloud_id
        );

        if let Some((eip_id, cvm_id)) = self.endpoints(&scope, request).await? {
            if let Err(e) = self
                .orchestrator
                .propagator()
                .link(RelationKind::EipCvm, &eip_id, &cvm_id)
                .await
            {
                warn!(error = %e, "[{}] optimistic eip edge not created", scope.vendor);
            }
        }

        self.resync_binding(&scope, request, options).await
    }

    /// Unbind an EIP on the vendor, then re-sync both sides.
    #[instrument(
        skip(self, scope, request, options),
        fields(vendor = %scope.vendor, eip = %request.eip_cloud_id, cvm = %request.cvm_cloud_id)
    )]
    pub async fn disassociate_eip(
        &self,
        scope: &SyncScope,
        request: &EipAssociation,
        options: &SyncOptions,
    ) -> Result<CascadeReport> {
        let scope = scope.unfiltered();
        scope
            .validate()
            .map_err(|e| SyncError::InvalidScope(e.to_string()))?;
        let client = self.orchestrator.registry().association(scope.vendor)?;

        self.orchestrator
            .call_vendor(&options.cancel, client.disassociate(&scope, request))
            .await?;
        info!(
            account_id = %scope.account_id,
            "[{}] disassociate eip {} from cvm {} success",
            scope.vendor,
            request.eip_cloud_id,
            request.cvm_cloud_id
        );

        if let Some((eip_id, cvm_id)) = self.endpoints(&scope, request).await? {
            self.orchestrator
                .propagator()
                .unlink(RelationKind::EipCvm, &eip_id, &cvm_id)
                .await?;
        }

        self.resync_binding(&scope, request, options).await
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    async fn resync_binding(
        &self,
        scope: &SyncScope,
        request: &EipAssociation,
        options: &SyncOptions,
    ) -> Result<CascadeReport> {
        let mut report = CascadeReport::default();

        let eip_scope = scope.clone().with_cloud_ids([request.eip_cloud_id.clone()]);
        report
            .passes
            .push(self.orchestrator.sync(ResourceKind::Eip, &eip_scope, options).await?);

        let cvm_scope = scope.clone().with_cloud_ids([request.cvm_cloud_id.clone()]);
        report.merge(self.sync_with_related(&cvm_scope, options).await?);
        Ok(report)
    }

    /// Internal ids of the EIP and CVM of a request, if both are stored.
    async fn endpoints(
        &self,
        scope: &SyncScope,
        request: &EipAssociation,
    ) -> Result<Option<(String, String)>> {
        let store = self.orchestrator.resources();
        let eip_ref = ResourceRef::CloudId(request.eip_cloud_id.clone());
        let cvm_ref = ResourceRef::CloudId(request.cvm_cloud_id.clone());

        let eip = store
            .resolve_refs(scope.vendor, ResourceKind::Eip, &scope.account_id, &[eip_ref.clone()])
            .await?
            .remove(&eip_ref);
        let cvm = store
            .resolve_refs(scope.vendor, ResourceKind::Cvm, &scope.account_id, &[cvm_ref.clone()])
            .await?
            .remove(&cvm_ref);

        Ok(eip.zip(cvm))
    }

    async fn stored_cvm_ids(&self, scope: &SyncScope, cvms: &CloudSnapshot) -> Result<Vec<String>> {
        let refs: Vec<ResourceRef> = cvms.keys().cloned().map(ResourceRef::CloudId).collect();
        Ok(self
            .orchestrator
            .resources()
            .resolve_refs(scope.vendor, ResourceKind::Cvm, &scope.account_id, &refs)
            .await?
            .into_values()
            .collect())
    }

    /// Cloud ids of `kind` reported by the instances or already linked to them.
    async fn related_cloud_ids(
        &self,
        scope: &SyncScope,
        kind: ResourceKind,
        cvms: &CloudSnapshot,
        cvm_ids: &[String],
    ) -> Result<BTreeSet<String>> {
        let vendor = scope.vendor;
        let store = self.orchestrator.resources();
        let mut cloud_ids = BTreeSet::new();
        let mut internal_ids = Vec::new();

        if instance_reported_kinds(vendor).contains(&kind) {
            let mut names = Vec::new();
            for reference in cvms.values().flat_map(|c| c.related_of(kind)) {
                match reference {
                    ResourceRef::CloudId(id) => {
                        cloud_ids.insert(id.clone());
                    }
                    ResourceRef::Name(_) => names.push(reference.clone()),
                }
            }
            // Names only resolve for resources already stored.
            if !names.is_empty() {
                internal_ids.extend(
                    store
                        .resolve_refs(vendor, kind, &scope.account_id, &names)
                        .await?
                        .into_values(),
                );
            }
        }

        let relation = relation_for(vendor, kind)?;
        let edges = self
            .orchestrator
            .propagator()
            .edges_of_instances(relation, cvm_ids)
            .await?;
        internal_ids.extend(edges.into_iter().map(|e| e.res_id));

        for chunk in internal_ids.chunks(MAX_PAGE_SIZE as usize) {
            let page = store
                .list(
                    kind,
                    &ResourceFilter::by_ids(chunk.to_vec()),
                    PageRequest::first(MAX_PAGE_SIZE),
                )
                .await?;
            cloud_ids.extend(page.items.into_iter().map(|r| r.cloud_id));
        }
        Ok(cloud_ids)
    }

    async fn sync_scoped(
        &self,
        kind: ResourceKind,
        scope: &SyncScope,
        cloud_ids: &BTreeSet<String>,
        options: &SyncOptions,
        report: &mut CascadeReport,
    ) -> Result<Vec<CloudResource>> {
        let ids: Vec<String> = cloud_ids.iter().cloned().collect();
        let mut synced = Vec::new();
        for chunk in ids.chunks(self.orchestrator.chunk_size()) {
            let scoped = scope.unfiltered().with_cloud_ids(chunk.to_vec());
            let (pass, cloud) = self
                .orchestrator
                .sync_keeping_snapshot(kind, &scoped, options)
                .await?;
            report.passes.push(pass);
            synced.extend(cloud.into_values());
        }
        Ok(synced)
    }
}
